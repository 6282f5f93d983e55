use nova_gdbmi::mock::MockCommand;
use nova_gdbmi::MiError;

use crate::harness::{loaded, Harness};

/// Address 0x1000 holds 0x00..0x0f and the page below it is readable for its
/// last 16 bytes only. 0x2000 answers for the wrong address, 0x3000 is
/// unmapped and 0x4000 fails outright.
async fn memory_debugger() -> Harness {
    loaded(|command: &MockCommand| {
        if command.name() != "data-read-memory-bytes" {
            return None;
        }
        let address = command.command.split_whitespace().nth(1).unwrap_or_default();
        let reply = match address {
            "0x0000000000001000" => command.done_with(
                r#"memory=[{begin="0x0000000000001000",offset="0x0000000000000000",end="0x0000000000001010",contents="000102030405060708090a0b0c0d0e0f"}]"#,
            ),
            "0x0000000000000ff0" => command.done_with(
                r#"memory=[{begin="0x0000000000000ff0",offset="0x0000000000000000",end="0x0000000000001000",contents="ffffffffffffffffffffffffffffffff"}]"#,
            ),
            "0x0000000000002000" => command.done_with(
                r#"memory=[{begin="0x0000000000002000",offset="0x0000000000000008",end="0x0000000000002010",contents="00"}]"#,
            ),
            "0x0000000000003000" => command.error("Unable to read memory."),
            _ => command.error("Cannot access memory at address 0x4000"),
        };
        Some(vec![reply])
    })
    .await
}

#[tokio::test]
async fn reads_bytes_at_reference() {
    let h = memory_debugger().await;

    let read = h.session.read_memory("0x1000", 0, 16).await.unwrap();
    assert_eq!(read.address, 0x1000);
    assert_eq!(read.bytes(), (0u8..16).collect::<Vec<_>>());
    assert_eq!(read.data, "AAECAwQFBgcICQoLDA0ODw==");
    assert_eq!(read.unreadable_bytes, 0);
    assert_eq!(
        h.mock.commands_named("data-read-memory-bytes")[0].command,
        "data-read-memory-bytes 0x0000000000001000 16"
    );
}

#[tokio::test]
async fn short_read_reports_unreadable_tail() {
    let h = memory_debugger().await;

    // A printed pointer value works as a reference; the offset is applied.
    let read = h
        .session
        .read_memory("0x1000 <buffer>", -16, 32)
        .await
        .unwrap();
    assert_eq!(read.address, 0xff0);
    assert_eq!(read.bytes(), vec![0xff; 16]);
    assert_eq!(read.unreadable_bytes, 16);
}

#[tokio::test]
async fn unreadable_range_is_an_empty_read() {
    let h = memory_debugger().await;

    let read = h.session.read_memory("12288", 0, 64).await.unwrap();
    assert_eq!(read.address, 0x3000);
    assert!(read.data.is_empty());
    assert_eq!(read.unreadable_bytes, 0);
}

#[tokio::test]
async fn other_debugger_errors_are_reported() {
    let h = memory_debugger().await;

    match h.session.read_memory("0x4000", 0, 8).await {
        Err(MiError::Command { message, command }) => {
            assert_eq!(message, "Cannot access memory at address 0x4000");
            assert_eq!(command, "data-read-memory-bytes 0x0000000000004000 8");
        }
        other => panic!("expected a command error, got {other:?}"),
    }
}

#[tokio::test]
async fn zero_count_does_not_reach_the_debugger() {
    let h = memory_debugger().await;

    let read = h.session.read_memory("0x1000", 4, 0).await.unwrap();
    assert_eq!(read.address, 0x1004);
    assert!(read.data.is_empty());
    assert!(h.mock.commands_named("data-read-memory-bytes").is_empty());
}

#[tokio::test]
async fn invalid_references_are_rejected() {
    let h = memory_debugger().await;

    for reference in ["", "   ", "main"] {
        assert!(matches!(
            h.session.read_memory(reference, 0, 8).await,
            Err(MiError::InvalidArgument(_))
        ));
    }
    assert!(h.mock.commands_named("data-read-memory-bytes").is_empty());
}

#[tokio::test]
async fn response_for_another_address_is_an_error() {
    let h = memory_debugger().await;

    assert!(matches!(
        h.session.read_memory("0x2000", 0, 16).await,
        Err(MiError::MemoryAddressMismatch {
            expected: 0x2000,
            actual: 0x2008
        })
    ));
}
