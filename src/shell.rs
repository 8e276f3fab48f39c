//! App shell around the chat: install prompt, share panel, deploy guide.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use url::Url;

use crate::persona::PERSONA_NAME;

const QR_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";
const QR_SIZE: &str = "120x120";
const QR_BACKGROUND: &str = "ffffff";
const SHARE_TEXT: &str = "Trò chuyện cùng Ông Lão Tiên Nhân - Một trải nghiệm vui vẻ!";
const LAUNCHER_NAME: &str = "tien-nhan-cac";

static IOS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)iphone|ipad|ipod|^ios$").expect("platform pattern is valid"));

pub const IOS_INSTALL_HINT: &str = "Trên iOS: bấm nút Chia sẻ rồi chọn \"Thêm vào MH chính\".";

pub const DEPLOY_GUIDE: &str = "\
Phi Thăng (Deploy)
  Netlify     Kéo thả folder. Add Key vào Environment var hoặc nhập trực tiếp trong ứng dụng.
  GitHub Pages Push code. Set Secret API_KEY trong Settings → Secrets, Source: GitHub Actions.
  Không có Key lúc deploy cũng không sao: vào ứng dụng rồi nhập Key sau (lệnh /key).

Quản lý Linh Phù
  /key         Đổi Key
  /key remove  Xóa Key đã lưu
  Key lấy miễn phí tại aistudio.google.com → Create API Key.";

pub fn is_ios(user_agent: &str) -> bool {
    IOS_RE.is_match(user_agent.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

/// A deferred install offer from the platform. It can be shown once.
#[async_trait]
pub trait InstallPrompt: Send {
    async fn prompt(self: Box<Self>) -> anyhow::Result<InstallOutcome>;
}

pub struct InstallFlow {
    deferred: Option<Box<dyn InstallPrompt>>,
    show_button: bool,
    ios: bool,
}

impl InstallFlow {
    pub fn new(user_agent: &str) -> Self {
        Self { deferred: None, show_button: false, ios: is_ios(user_agent) }
    }

    pub fn capture(&mut self, prompt: Box<dyn InstallPrompt>) {
        self.deferred = Some(prompt);
        self.show_button = true;
    }

    pub fn show_install_button(&self) -> bool {
        self.show_button
    }

    pub fn show_ios_hint(&self) -> bool {
        self.ios
    }

    /// Shows the captured prompt. The handle is spent whatever the user
    /// picks; only acceptance hides the button.
    pub async fn click(&mut self) -> Option<InstallOutcome> {
        let prompt = self.deferred.take()?;
        match prompt.prompt().await {
            Ok(outcome) => {
                if outcome == InstallOutcome::Accepted {
                    self.show_button = false;
                }
                tracing::info!(?outcome, "install prompt answered");
                Some(outcome)
            }
            Err(e) => {
                tracing::warn!(error = %e, "install prompt failed");
                None
            }
        }
    }
}

/// Installs a small launcher script into the user's bin directory.
pub struct LauncherPrompt {
    launcher: PathBuf,
    exe: PathBuf,
}

impl LauncherPrompt {
    pub fn new(bin_dir: &Path, exe: PathBuf) -> Self {
        Self { launcher: bin_dir.join(LAUNCHER_NAME), exe }
    }

    /// Offered only while no launcher exists, like a browser that stops
    /// offering installation once the app is installed.
    pub fn detect() -> Option<Self> {
        let home = std::env::var_os("HOME")?;
        let exe = std::env::current_exe().ok()?;
        let prompt = Self::new(&PathBuf::from(home).join(".local").join("bin"), exe);
        (!prompt.launcher.exists()).then_some(prompt)
    }

    pub fn launcher(&self) -> &Path {
        &self.launcher
    }
}

#[async_trait]
impl InstallPrompt for LauncherPrompt {
    async fn prompt(self: Box<Self>) -> anyhow::Result<InstallOutcome> {
        if let Some(dir) = self.launcher.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let script = format!("#!/bin/sh\nexec \"{}\" \"$@\"\n", self.exe.display());
        tokio::fs::write(&self.launcher, script).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.launcher, std::fs::Permissions::from_mode(0o755)).await?;
        }
        Ok(InstallOutcome::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePanel {
    pub url: Url,
    pub title: String,
    pub text: String,
}

impl SharePanel {
    pub fn new(app_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self { url: Url::parse(app_url)?, title: PERSONA_NAME.to_string(), text: SHARE_TEXT.to_string() })
    }

    pub fn qr_image_url(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("size", QR_SIZE)
            .append_pair("data", self.url.as_str())
            .append_pair("bgcolor", QR_BACKGROUND)
            .finish();
        format!("{QR_ENDPOINT}?{query}")
    }

    pub fn render(&self) -> String {
        format!(
            "Truyền Tống Trận\n  {}\n  {}\n  Link: {}\n  QR:   {}",
            self.title,
            self.text,
            self.url,
            self.qr_image_url()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Copied,
    Failed,
}

pub trait ShareTarget {
    fn supports_native_share(&self) -> bool;
    fn share(&mut self, panel: &SharePanel) -> anyhow::Result<()>;
    fn copy_link(&mut self, url: &str) -> anyhow::Result<()>;
}

/// Native share when the target has one, otherwise copy the link.
pub fn share_or_copy(target: &mut dyn ShareTarget, panel: &SharePanel) -> ShareOutcome {
    let (result, ok) = if target.supports_native_share() {
        (target.share(panel), ShareOutcome::Shared)
    } else {
        (target.copy_link(panel.url.as_str()), ShareOutcome::Copied)
    };
    match result {
        Ok(()) => ok,
        Err(e) => {
            tracing::warn!(error = %e, "sharing failed");
            ShareOutcome::Failed
        }
    }
}

/// Copies through the OSC 52 escape, which most terminal emulators forward
/// to the system clipboard, and prints the link as well.
pub struct TerminalShareTarget<W: Write> {
    out: W,
}

impl<W: Write> TerminalShareTarget<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ShareTarget for TerminalShareTarget<W> {
    fn supports_native_share(&self) -> bool {
        false
    }

    fn share(&mut self, _panel: &SharePanel) -> anyhow::Result<()> {
        anyhow::bail!("terminal has no native share sheet")
    }

    fn copy_link(&mut self, url: &str) -> anyhow::Result<()> {
        write!(self.out, "\x1b]52;c;{}\x07", STANDARD.encode(url))?;
        writeln!(self.out, "Đã chép: {url}")?;
        self.out.flush()?;
        Ok(())
    }
}
