//! Tests for reading call state through the calling conventions

mod common;

use common::{ScriptedBackend, THREAD};
use strider_core::abi::AbiDescriptor;
use strider_core::types::{Address, Architecture};

#[test]
fn test_arm64_return_address_comes_from_link_register()
{
    let backend = ScriptedBackend::new(Architecture::Arm64)
        .with_register("lr", 0x1008)
        .with_register("sp", 0x7000);
    let abi = AbiDescriptor::for_architecture(Architecture::Arm64).unwrap();

    assert_eq!(abi.get_return_address(&backend, THREAD, 0).unwrap(), Address::new(0x1008));
}

#[test]
fn test_arm64_return_address_needs_link_register()
{
    let backend = ScriptedBackend::new(Architecture::Arm64).with_register("sp", 0x7000);
    let abi = AbiDescriptor::for_architecture(Architecture::Arm64).unwrap();

    assert!(abi.get_return_address(&backend, THREAD, 0).is_err());
}

#[test]
fn test_x86_64_return_address_comes_from_stack_top()
{
    let mut backend = ScriptedBackend::new(Architecture::X86_64).with_register("rsp", 0x7000);
    backend
        .memory
        .push((Address::new(0x7000), 0x4010_u64.to_le_bytes().to_vec()));
    let abi = AbiDescriptor::for_architecture(Architecture::X86_64).unwrap();

    assert_eq!(abi.get_return_address(&backend, THREAD, 0).unwrap(), Address::new(0x4010));
}

#[test]
fn test_args_skip_unreadable_registers()
{
    let backend = ScriptedBackend::new(Architecture::Arm64)
        .with_register("x0", 1)
        .with_register("x2", 3);
    let abi = AbiDescriptor::for_architecture(Architecture::Arm64).unwrap();

    let args = abi.get_args(&backend, THREAD, 0, 3);
    let read: Vec<(&str, u64)> = args.iter().map(|arg| (arg.register, arg.value)).collect();
    assert_eq!(read, vec![("x0", 1), ("x2", 3)]);
    assert_eq!(abi.get_return_value(&backend, THREAD, 0).unwrap(), 1);
}
