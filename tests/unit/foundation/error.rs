use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        OverlayError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(OverlayError::decode("x").to_string().contains("decode error:"));
    assert!(OverlayError::render("x").to_string().contains("render error:"));
    assert!(OverlayError::config("x").to_string().contains("config error:"));
    assert_eq!(OverlayError::Cancelled.to_string(), "operation cancelled");
}

#[test]
fn io_error_names_the_path() {
    let err = OverlayError::io(
        "/tmp/poster.jpg",
        std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
    );
    let msg = err.to_string();
    assert!(msg.contains("/tmp/poster.jpg"));
    assert!(msg.contains("gone"));
}

#[test]
fn transient_kinds_are_retryable() {
    let locked = OverlayError::io(
        "a",
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
    );
    assert!(locked.is_transient());

    let missing = OverlayError::io("a", std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
    assert!(!missing.is_transient());
    assert!(!OverlayError::decode("bad").is_transient());
    assert!(OverlayError::Cancelled.is_cancelled());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = OverlayError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
