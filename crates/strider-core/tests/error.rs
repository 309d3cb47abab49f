//! Tests for error handling

use strider_core::breakpoints::BreakpointId;
use strider_core::error::{TracerError, TracerResult};
use strider_core::types::Address;

#[test]
fn test_launch_failed_display()
{
    let error = TracerError::LaunchFailed {
        program: "/bin/app".to_string(),
        reason: "no such file".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("/bin/app"));
    assert!(message.contains("no such file"));
}

#[test]
fn test_command_failed_names_command()
{
    let error = TracerError::command("step_instruction", "process is running");
    let message = format!("{}", error);
    assert!(message.contains("step_instruction"));
    assert!(message.contains("process is running"));
}

#[test]
fn test_memory_read_failed_shows_address()
{
    let error = TracerError::MemoryReadFailed {
        address: Address::new(0xdead),
        length: 8,
    };
    let message = format!("{}", error);
    assert!(message.contains("0xdead"));
    assert!(message.contains('8'));
}

#[test]
fn test_breakpoint_id_not_found()
{
    let error = TracerError::BreakpointIdNotFound(BreakpointId::from_raw(17));
    assert!(format!("{}", error).contains("17"));
}

#[test]
fn test_unsupported_architecture_from_parse()
{
    let error = "riscv64-unknown-linux-gnu"
        .parse::<strider_core::types::Architecture>()
        .unwrap_err();
    match error {
        TracerError::UnsupportedArchitecture(name) => assert!(name.starts_with("riscv64")),
        other => panic!("Expected UnsupportedArchitecture, got {other:?}"),
    }
}

#[test]
fn test_io_error_conversion()
{
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let error: TracerError = io.into();
    assert!(matches!(error, TracerError::Io(_)));
}

#[test]
fn test_result_type()
{
    // Test that TracerResult is properly aliased
    let _result: TracerResult<()> = Ok(());
    let _error_result: TracerResult<()> = Err(TracerError::SymbolNotFound(Address::ZERO));
}
