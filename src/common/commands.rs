use std::path::PathBuf;

/// Lệnh UI gửi xuống chat worker.
#[derive(Debug, Clone)]
pub enum ChatCommand {
    /// Mở hội thoại với một người (tạo mới nếu chưa có).
    /// Closes whatever conversation was open before.
    OpenConversation { counterpart: String },
    CloseConversation,
    SendText(String),
    /// Upload the file and send it as an image message.
    SendImage(PathBuf),
}
