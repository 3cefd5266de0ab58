use nats_worker::StreamSpec;

pub const CREATE_SUBJECT: &str = "mail:create";
pub const SEND_SUBJECT: &str = "mail:send";
pub const ERRORS_SUBJECT: &str = "mail:errors";

pub const MAIL_STREAM: &str = "MAIL";
pub const ERRORS_STREAM: &str = "MAIL_ERRORS";

/// Streams backing the pipeline subjects.
pub fn streams() -> [StreamSpec; 2] {
    [
        StreamSpec::new(MAIL_STREAM, &[CREATE_SUBJECT, SEND_SUBJECT]),
        StreamSpec::new(ERRORS_STREAM, &[ERRORS_SUBJECT]),
    ]
}
