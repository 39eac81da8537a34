use agent_batch::AppError;

#[test]
fn display_prefixes_error_kind() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Io("disk".into()).to_string(), "io: disk");
    assert_eq!(
        AppError::Launch("no such file".into()).to_string(),
        "launch: no such file"
    );
    assert_eq!(AppError::Report("full".into()).to_string(), "report: full");
    assert_eq!(
        AppError::Interrupted("ctrl-c".into()).to_string(),
        "interrupted: ctrl-c"
    );
    assert_eq!(
        AppError::NotFound("session t1".into()).to_string(),
        "not found: session t1"
    );
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Launch("failed to spawn worker".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(msg) if msg.contains("gone")));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let parse: Result<toml::Value, _> = toml::from_str("= broken");
    let err: AppError = parse.expect_err("invalid toml").into();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    let err = AppError::Report("x".into());
    assert_error(&err);
    assert!(format!("{err:?}").contains("Report"));
}
