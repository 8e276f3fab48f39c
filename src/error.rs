use thiserror::Error;
use uuid::Uuid;

use crate::emotion::{parse_emotion_tag, Emotion};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("MISSING_API_KEY")]
    MissingCredential,
    #[error("HTTP {status} {reason}: {message}")]
    Remote { status: u16, reason: String, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed stream event: {0}")]
    Stream(String),
    #[error("credential store error: {0}")]
    Store(String),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("message {0} not found")]
    UnknownMessage(Uuid),
    #[error("message {0} is already finalized")]
    Finalized(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MissingCredential,
    InvalidCredential,
    PermissionDenied,
    RateLimited,
    ServiceUnavailable,
    Transport,
}

/// Maps the textual form of a failure to a [`FailureKind`].
///
/// The remote API gives no error contract we can rely on, so this is
/// substring matching; keep every such check in here.
pub fn classify(error_text: &str) -> FailureKind {
    let has = |needles: &[&str]| needles.iter().any(|n| error_text.contains(n));
    if has(&["MISSING_API_KEY"]) {
        FailureKind::MissingCredential
    } else if has(&["400", "InvalidArgument", "INVALID_ARGUMENT"]) {
        FailureKind::InvalidCredential
    } else if has(&["403", "PermissionDenied", "PERMISSION_DENIED"]) {
        FailureKind::PermissionDenied
    } else if has(&["429", "ResourceExhausted", "RESOURCE_EXHAUSTED"]) {
        FailureKind::RateLimited
    } else if has(&["503", "Unavailable", "UNAVAILABLE"]) {
        FailureKind::ServiceUnavailable
    } else if has(&["API key"]) {
        FailureKind::MissingCredential
    } else {
        FailureKind::Transport
    }
}

impl FailureKind {
    /// Persona explanation, tagged with the emotion the avatar should show.
    pub fn friendly_message(&self) -> &'static str {
        match self {
            FailureKind::MissingCredential => "[[BUON]] Linh phù (API Key) không thấy đâu cả. Tiểu hữu đã nhập đúng chưa?",
            FailureKind::InvalidCredential => "[[NGAC_NHIEN]] Linh phù (Key) có vẻ không hợp lệ. Tiểu hữu kiểm tra xem có copy thừa dấu cách không?",
            FailureKind::PermissionDenied => "[[BUON]] Linh phù này chưa được kích hoạt hoặc bị cấm cửa rồi. Hãy kiểm tra lại trên Google Cloud nhé.",
            FailureKind::RateLimited => "[[MET]] Hộc hộc... Tiểu hữu hỏi nhanh quá, lão thở không kịp (Hết quota miễn phí). Đợi chút nhé.",
            FailureKind::ServiceUnavailable => "[[MET]] Thiên địa linh khí đang hỗn loạn (Server Google bận), lão cần tịnh tâm một chút. Thử lại sau nhé.",
            FailureKind::Transport => "[[BUON]] Có luồng tà khí làm nhiễu loạn (Lỗi kết nối). Lão không nghe rõ.",
        }
    }

    /// Avatar state after the failure: tired (neutral) when the service is
    /// overloaded, sad otherwise.
    pub fn emotion(&self) -> Emotion {
        match self {
            FailureKind::RateLimited | FailureKind::ServiceUnavailable => Emotion::Neutral,
            _ => Emotion::Sad,
        }
    }

    pub fn reopens_credential_prompt(&self) -> bool {
        matches!(self, FailureKind::MissingCredential | FailureKind::InvalidCredential)
    }

    /// Body of the error bubble: the explanation plus the raw failure text.
    pub fn error_content(&self, raw: &str) -> String {
        let friendly = parse_emotion_tag(self.friendly_message()).clean_text;
        format!("> *{friendly}*\n> \n> _Lỗi chi tiết: {raw}_")
    }
}
