//! Terminal rendition of the chat surface.
//!
//! The transcript is append-only on a terminal, so repaints print only what
//! changed since the previous frame: new messages, and the grown tail of
//! the message that is streaming.

use std::collections::HashMap;
use std::io::{self, Write};

use uuid::Uuid;

use crate::avatar::terminal_face;
use crate::chat::{ChatView, Surface};
use crate::conversation::{Message, Role};
use crate::emotion::is_partial_tag;
use crate::markdown::render_markdown;
use crate::persona::{PERSONA_NAME, SUGGESTED_QUESTIONS};

pub const CREDENTIAL_HINT: &str =
    "Lão cần Linh Phù (Gemini API Key, bắt đầu bằng AIza) để đàm đạo. Dán key vào dòng dưới, hoặc gõ /help.";

const RULE_WIDTH: usize = 40;

pub struct TerminalSurface<W: Write> {
    out: W,
    ansi: bool,
    echo_user: bool,
    first_id: Option<Uuid>,
    printed: HashMap<Uuid, String>,
    open: Option<Uuid>,
    typing_shown: bool,
    suggestions_shown: bool,
    prompt_shown: bool,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, ansi: bool, echo_user: bool) -> Self {
        Self {
            out,
            ansi,
            echo_user,
            first_id: None,
            printed: HashMap::new(),
            open: None,
            typing_shown: false,
            suggestions_shown: false,
            prompt_shown: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, view: &ChatView<'_>) -> io::Result<()> {
        let first = view.messages.first().map(|m| m.id);
        if first != self.first_id {
            if self.first_id.is_some() {
                self.close_open()?;
                writeln!(self.out, "{}", "─".repeat(RULE_WIDTH))?;
            }
            self.first_id = first;
            self.printed.clear();
            self.suggestions_shown = false;
        }

        let face = terminal_face(&view.avatar);
        for msg in view.messages {
            self.draw_message(msg, &face)?;
        }

        let newest = view.scroll_to.and_then(|id| view.messages.iter().rev().find(|m| m.id == id));
        let typing = newest.is_some_and(Message::is_typing);
        if typing && !self.typing_shown && self.ansi {
            write!(self.out, "\x1b[2m{face} …\x1b[0m")?;
            self.typing_shown = true;
        }

        if view.suggestions && !self.suggestions_shown && self.open.is_none() {
            for (i, q) in SUGGESTED_QUESTIONS.iter().enumerate() {
                writeln!(self.out, "  /{} {q}", i + 1)?;
            }
            self.suggestions_shown = true;
        }

        if view.ui.credential_prompt_open && !self.prompt_shown && self.open.is_none() {
            writeln!(self.out, "{CREDENTIAL_HINT}")?;
            self.prompt_shown = true;
        } else if !view.ui.credential_prompt_open {
            self.prompt_shown = false;
        }

        self.out.flush()
    }

    fn draw_message(&mut self, msg: &Message, face: &str) -> io::Result<()> {
        let shown = self.shown_content(msg);
        match self.printed.get(&msg.id) {
            None => {
                if msg.is_streaming && shown.is_empty() {
                    return Ok(());
                }
                self.close_open()?;
                let echoed = msg.role == Role::Assistant || self.echo_user;
                if echoed {
                    self.write_header(msg, face)?;
                    write!(self.out, "{shown}")?;
                    if msg.is_streaming {
                        self.open = Some(msg.id);
                    } else {
                        writeln!(self.out)?;
                    }
                }
                self.printed.insert(msg.id, shown);
            }
            Some(done) => {
                let tail = unseen_tail(done, &shown);
                if !tail.is_empty() {
                    write!(self.out, "{tail}")?;
                }
                self.printed.insert(msg.id, shown);
                if !msg.is_streaming && self.open == Some(msg.id) {
                    writeln!(self.out)?;
                    self.open = None;
                }
            }
        }
        Ok(())
    }

    /// Text to show for a message right now. Replies are markdown; while one
    /// streams, only whole paragraphs are shown, so markup is never split
    /// and a leading emotion tag never flashes on screen.
    fn shown_content(&self, msg: &Message) -> String {
        if msg.role == Role::User {
            return msg.content.clone();
        }
        let source = if !msg.is_streaming {
            msg.content.as_str()
        } else if is_partial_tag(&msg.content) {
            ""
        } else {
            msg.content.rfind("\n\n").map_or("", |i| &msg.content[..i + 2])
        };
        render_markdown(source, self.ansi)
    }

    fn write_header(&mut self, msg: &Message, face: &str) -> io::Result<()> {
        if self.typing_shown {
            write!(self.out, "\r\x1b[K")?;
            self.typing_shown = false;
        }
        match (msg.role, msg.is_error, self.ansi) {
            (Role::User, _, true) => write!(self.out, "\x1b[1;36mBạn ›\x1b[0m "),
            (Role::User, _, false) => write!(self.out, "Bạn › "),
            (Role::Assistant, true, true) => write!(self.out, "\x1b[31m{face} !\x1b[0m "),
            (Role::Assistant, true, false) => write!(self.out, "{face} ! "),
            (Role::Assistant, false, true) => write!(self.out, "\x1b[1;33m{face} {PERSONA_NAME}:\x1b[0m "),
            (Role::Assistant, false, false) => write!(self.out, "{face} {PERSONA_NAME}: "),
        }
    }

    fn close_open(&mut self) -> io::Result<()> {
        if self.open.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}

/// The part of `now` not yet on screen. A re-render that no longer
/// extends what was printed continues from where the two diverge.
fn unseen_tail<'a>(printed: &str, now: &'a str) -> &'a str {
    let common = printed
        .char_indices()
        .zip(now.chars())
        .find(|((_, a), b)| a != b)
        .map_or(printed.len().min(now.len()), |((i, _), _)| i);
    &now[common..]
}

impl<W: Write> Surface for TerminalSurface<W> {
    fn repaint(&mut self, view: &ChatView<'_>) {
        if let Err(e) = self.draw(view) {
            tracing::warn!(error = %e, "terminal repaint failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::{render, AvatarInput};
    use crate::chat::UiState;
    use crate::conversation::Conversation;
    use crate::emotion::{parse_emotion_tag, Emotion};
    use crate::error::FailureKind;
    use crate::persona::PASTED_KEY_WARNING;

    fn paint(surface: &mut TerminalSurface<Vec<u8>>, conv: &Conversation, ui: UiState, suggestions: bool) {
        let avatar = render(&AvatarInput { emotion: ui.emotion, loading: ui.loading, streaming: ui.streaming, ..Default::default() });
        surface.repaint(&ChatView { messages: conv.messages(), ui, avatar, scroll_to: conv.last_id(), suggestions });
    }

    fn output(surface: TerminalSurface<Vec<u8>>) -> String {
        String::from_utf8(surface.into_inner()).unwrap()
    }

    #[test]
    fn streams_incrementally_and_hides_partial_tags() {
        let mut surface = TerminalSurface::new(Vec::new(), false, true);
        let mut conv = Conversation::with_greeting("Chào mừng");
        let mut ui = UiState::default();
        paint(&mut surface, &conv, ui, false);

        conv.push(Message::user("hi"));
        ui.loading = true;
        paint(&mut surface, &conv, ui, false);

        let id = conv.push(Message::placeholder());
        let chunks = ["[", "[[VU", "Chào", "Chào tiểu hữu.\n\n", "Chào tiểu hữu.\n\n**Ngồi** đi"];
        for content in chunks {
            conv.replace_streaming_content(id, content.to_string()).unwrap();
            ui.loading = false;
            ui.streaming = true;
            ui.emotion = if content.starts_with('[') { Emotion::Neutral } else { Emotion::Happy };
            paint(&mut surface, &conv, ui, false);
        }
        conv.finalize(id).unwrap();
        ui.streaming = false;
        paint(&mut surface, &conv, ui, false);

        let out = output(surface);
        assert!(!out.contains('['), "{out}");
        assert!(!out.contains("**"), "{out}");
        assert_eq!(out.matches("Chào mừng").count(), 1);
        assert!(out.contains("Bạn › hi\n"));
        assert!(out.contains(&format!("(^o^) {PERSONA_NAME}: Chào tiểu hữu.\n\nNgồi đi\n")), "{out}");
    }

    #[test]
    fn user_turns_are_not_echoed_on_interactive_terminals() {
        let mut surface = TerminalSurface::new(Vec::new(), false, false);
        let mut conv = Conversation::with_greeting("Chào mừng");
        conv.push(Message::user("bí mật"));
        paint(&mut surface, &conv, UiState::default(), false);
        assert!(!output(surface).contains("bí mật"));
    }

    #[test]
    fn errors_and_dropped_placeholders() {
        let mut surface = TerminalSurface::new(Vec::new(), false, true);
        let mut conv = Conversation::with_greeting("Chào");
        let id = conv.push(Message::placeholder());
        paint(&mut surface, &conv, UiState { loading: true, ..Default::default() }, false);
        conv.abandon(id).unwrap();
        conv.push(Message::error("> *Lỗi*"));
        paint(&mut surface, &conv, UiState { emotion: Emotion::Sad, ..Default::default() }, false);

        let out = output(surface);
        assert!(out.ends_with("(T_T) ! │ Lỗi\n"), "{out}");
    }

    #[test]
    fn replies_and_error_bubbles_render_markdown() {
        let mut surface = TerminalSurface::new(Vec::new(), false, true);
        let mut conv = Conversation::with_greeting("Chào");
        conv.push(Message::assistant(parse_emotion_tag(PASTED_KEY_WARNING).clean_text));
        conv.push(Message::error(FailureKind::Transport.error_content("connection reset")));
        paint(&mut surface, &conv, UiState { emotion: Emotion::Sad, ..Default::default() }, false);

        let out = output(surface);
        assert!(!out.contains("**") && !out.contains("> *"), "{out}");
        assert!(out.contains("API Key"), "{out}");
        assert!(out.contains("│ Có luồng tà khí"), "{out}");
        assert!(out.contains("│ Lỗi chi tiết: connection reset\n"), "{out}");
    }

    #[test]
    fn ansi_replies_are_styled() {
        let mut surface = TerminalSurface::new(Vec::new(), true, true);
        let mut conv = Conversation::with_greeting("Chào");
        conv.push(Message::assistant("Đây là **Linh Phù**".to_string()));
        paint(&mut surface, &conv, UiState::default(), false);
        assert!(output(surface).contains("Đây là \x1b[1mLinh Phù\x1b[0m\n"));
    }

    #[test]
    fn typing_indicator_follows_newest_message() {
        let mut surface = TerminalSurface::new(Vec::new(), true, true);
        let mut conv = Conversation::with_greeting("Chào");
        conv.push(Message::placeholder());
        let ui = UiState { loading: true, ..Default::default() };
        let avatar = render(&AvatarInput { loading: true, ..Default::default() });
        surface.repaint(&ChatView { messages: conv.messages(), ui, avatar, scroll_to: None, suggestions: false });
        surface.repaint(&ChatView { messages: conv.messages(), ui, avatar, scroll_to: conv.last_id(), suggestions: false });
        assert_eq!(output(surface).matches(" …\x1b[0m").count(), 1);
    }

    #[test]
    fn diverging_render_continues_from_the_difference() {
        assert_eq!(unseen_tail("Chào", "Chào tiểu hữu"), " tiểu hữu");
        assert_eq!(unseen_tail("**a", "ab"), "ab");
        assert_eq!(unseen_tail("Chào tiểu hữu", "Chào"), "");
    }

    #[test]
    fn reset_prints_a_rule_and_the_new_greeting() {
        let mut surface = TerminalSurface::new(Vec::new(), false, true);
        let mut conv = Conversation::with_greeting("Lần một");
        paint(&mut surface, &conv, UiState::default(), true);
        paint(&mut surface, &conv, UiState::default(), true);
        conv.reset("Lần hai");
        paint(&mut surface, &conv, UiState::default(), true);

        let out = output(surface);
        assert!(out.contains(&"─".repeat(RULE_WIDTH)));
        assert!(out.contains("Lần hai"));
        assert_eq!(out.matches(SUGGESTED_QUESTIONS[0]).count(), 2);
    }

    #[test]
    fn credential_hint_shown_once_per_opening() {
        let mut surface = TerminalSurface::new(Vec::new(), false, true);
        let conv = Conversation::with_greeting("Chào");
        let open = UiState { credential_prompt_open: true, ..Default::default() };
        paint(&mut surface, &conv, open, false);
        paint(&mut surface, &conv, open, false);
        paint(&mut surface, &conv, UiState::default(), false);
        paint(&mut surface, &conv, open, false);
        assert_eq!(output(surface).matches(CREDENTIAL_HINT).count(), 2);
    }
}
