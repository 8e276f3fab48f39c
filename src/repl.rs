use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::chat::{ChatController, Surface};
use crate::persona::{REMOVE_KEY_CONFIRM, RESET_CONFIRM, SUGGESTED_QUESTIONS};
use crate::shell::{
    share_or_copy, InstallFlow, InstallOutcome, SharePanel, TerminalShareTarget, DEPLOY_GUIDE, IOS_INSTALL_HINT,
};

pub const HELP: &str = "\
Lệnh:
  /help         Trợ giúp
  /reset        Bắt đầu lại cuộc trò chuyện
  /key          Nhập hoặc đổi Linh Phù (API Key)
  /key remove   Xóa Key đã lưu
  /close        Đóng bảng nhập Key
  /lucky        Bốc một quẻ may mắn
  /1 … /4       Hỏi câu gợi ý
  /share        Truyền Tống Trận (link, QR)
  /deploy       Hướng dẫn Phi Thăng (deploy)
  /install      Cài lối tắt khởi động
  /quit         Rời Tiên Nhân Các";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Message(String),
    Help,
    Reset,
    Key,
    KeyRemove,
    Close,
    Lucky,
    Suggest(usize),
    Share,
    Deploy,
    Install,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Message(line.to_string());
    };
    let mut words = rest.split_whitespace();
    let head = words.next().unwrap_or_default().to_lowercase();
    let arg = words.next().map(str::to_lowercase);
    match (head.as_str(), arg.as_deref()) {
        ("help" | "h" | "?", _) => Command::Help,
        ("reset" | "new", _) => Command::Reset,
        ("key", None) => Command::Key,
        ("key", Some("remove" | "rm" | "delete")) => Command::KeyRemove,
        ("close" | "cancel", _) => Command::Close,
        ("lucky", _) => Command::Lucky,
        ("share", _) => Command::Share,
        ("deploy", _) => Command::Deploy,
        ("install", _) => Command::Install,
        ("quit" | "exit" | "q", _) => Command::Quit,
        (n, None) => match n.parse::<usize>() {
            Ok(i) if (1..=SUGGESTED_QUESTIONS.len()).contains(&i) => Command::Suggest(i - 1),
            _ => Command::Unknown(line.to_string()),
        },
        _ => Command::Unknown(line.to_string()),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "c" | "có" | "co")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Reset,
    RemoveKey,
    Install,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl<S: Surface, W: Write> {
    controller: ChatController<S>,
    install: InstallFlow,
    share: SharePanel,
    out: W,
    pending: Option<Pending>,
}

impl<S: Surface, W: Write> Repl<S, W> {
    pub fn new(controller: ChatController<S>, install: InstallFlow, share: SharePanel, out: W) -> Self {
        Self { controller, install, share, out, pending: None }
    }

    #[cfg(test)]
    pub fn controller(&self) -> &ChatController<S> {
        &self.controller
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }

    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> anyhow::Result<()> {
        let mut lines = input.lines();
        self.controller.bootstrap().await;
        loop {
            self.write_prompt()?;
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };
            match self.handle_line(&line).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => {
                    tracing::error!(error = %e, "command failed");
                    writeln!(self.out, "Lỗi: {e}")?;
                }
            }
        }
        writeln!(self.out, "\nBảo trọng, tiểu hữu!")?;
        Ok(())
    }

    fn write_prompt(&mut self) -> std::io::Result<()> {
        let prompt = if self.pending.is_some() {
            "(y/n) › "
        } else if self.controller.ui().credential_prompt_open {
            "Linh Phù › "
        } else {
            "› "
        };
        write!(self.out, "{prompt}")?;
        self.out.flush()
    }

    pub async fn handle_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        if let Some(pending) = self.pending.take() {
            if is_yes(line) {
                self.confirm(pending).await?;
            }
            return Ok(Flow::Continue);
        }

        let command = parse_command(line);
        if self.controller.ui().credential_prompt_open {
            if let Command::Message(key) = &command {
                if !self.controller.save_credential(key).await? {
                    writeln!(self.out, "Linh Phù phải bắt đầu bằng AIza và dài hơn 20 ký tự.")?;
                }
                return Ok(Flow::Continue);
            }
        }

        match command {
            Command::Empty => {}
            Command::Message(text) => self.controller.send_message(&text).await,
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Reset => self.ask(Pending::Reset, RESET_CONFIRM)?,
            Command::Key => self.controller.open_credential_prompt(),
            Command::KeyRemove => self.ask(Pending::RemoveKey, REMOVE_KEY_CONFIRM)?,
            Command::Close => {
                if !self.controller.close_credential_prompt() {
                    writeln!(self.out, "Chưa có Linh Phù thì chưa thể đàm đạo.")?;
                }
            }
            Command::Lucky => {
                self.controller.lucky_draw().await;
            }
            Command::Suggest(i) => {
                if self.controller.suggestions_visible() {
                    self.controller.send_message(SUGGESTED_QUESTIONS[i]).await;
                } else {
                    writeln!(self.out, "Câu gợi ý chỉ dùng lúc mới bắt đầu (gõ /reset).")?;
                }
            }
            Command::Share => {
                writeln!(self.out, "{}", self.share.render())?;
                share_or_copy(&mut TerminalShareTarget::new(&mut self.out), &self.share);
            }
            Command::Deploy => writeln!(self.out, "{DEPLOY_GUIDE}")?,
            Command::Install => {
                if self.install.show_install_button() {
                    self.ask(Pending::Install, "Cài lối tắt khởi động vào ~/.local/bin?")?;
                } else if self.install.show_ios_hint() {
                    writeln!(self.out, "{IOS_INSTALL_HINT}")?;
                } else {
                    writeln!(self.out, "Không có gì để cài thêm.")?;
                }
            }
            Command::Quit => return Ok(Flow::Quit),
            Command::Unknown(raw) => writeln!(self.out, "Lệnh lạ: {raw}. Gõ /help để xem lệnh.")?,
        }
        Ok(Flow::Continue)
    }

    fn ask(&mut self, pending: Pending, question: &str) -> std::io::Result<()> {
        self.pending = Some(pending);
        writeln!(self.out, "{question} (y/n)")
    }

    async fn confirm(&mut self, pending: Pending) -> anyhow::Result<()> {
        match pending {
            Pending::Reset => self.controller.reset_conversation().await,
            Pending::RemoveKey => self.controller.remove_credential().await?,
            Pending::Install => match self.install.click().await {
                Some(InstallOutcome::Accepted) => writeln!(self.out, "Đã cài. Lần sau gõ `tien-nhan-cac` để vào.")?,
                Some(InstallOutcome::Dismissed) | None => writeln!(self.out, "Chưa cài được.")?,
            },
        }
        Ok(())
    }
}
