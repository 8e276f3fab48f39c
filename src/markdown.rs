//! Markdown to terminal text.
//!
//! Replies and error bubbles are markdown. On an ANSI terminal emphasis,
//! strong text, headings and inline code become SGR styles; otherwise the
//! markup is dropped and only the text remains. Block quotes get a bar
//! prefix on every line.
//!
//! Output is emitted lazily: block separators are written only when the
//! next block starts and the result never ends in a newline. Rendering a
//! source cut at a paragraph boundary therefore yields a prefix of the
//! rendering of the whole source, which is what lets the terminal stream a
//! reply paragraph by paragraph.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

const RESET: &str = "\x1b[0m";
const QUOTE_BAR: &str = "│";
const CODE_INDENT: &str = "    ";
const RULE: &str = "────────────────────";

pub fn render_markdown(source: &str, ansi: bool) -> String {
    let mut renderer = Renderer::new(ansi);
    for event in Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH) {
        renderer.event(event);
    }
    renderer.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Strong,
    Emphasis,
    Strike,
    Code,
}

impl Style {
    fn sgr(self) -> &'static str {
        match self {
            Style::Strong => "\x1b[1m",
            Style::Emphasis => "\x1b[3m",
            Style::Strike => "\x1b[9m",
            Style::Code => "\x1b[36m",
        }
    }
}

struct Renderer {
    out: String,
    ansi: bool,
    styles: Vec<Style>,
    applied: Vec<Style>,
    quote_depth: usize,
    /// Next ordinal per open list; `None` for bullet lists.
    lists: Vec<Option<u64>>,
    pending_breaks: usize,
    line_start: bool,
    /// An item marker was just written; the item's first block must not
    /// push its text onto a new line.
    item_head: bool,
    in_code_block: bool,
    links: Vec<(String, usize)>,
}

impl Renderer {
    fn new(ansi: bool) -> Self {
        Self {
            out: String::new(),
            ansi,
            styles: Vec::new(),
            applied: Vec::new(),
            quote_depth: 0,
            lists: Vec::new(),
            pending_breaks: 0,
            line_start: true,
            item_head: false,
            in_code_block: false,
            links: Vec::new(),
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                self.styles.push(Style::Code);
                self.put(&code);
                self.styles.pop();
            }
            Event::Html(html) | Event::InlineHtml(html) => self.text(&html),
            Event::SoftBreak | Event::HardBreak => self.pending_breaks += 1,
            Event::Rule => {
                self.block();
                self.put(RULE);
            }
            Event::TaskListMarker(done) => self.put(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.block(),
            Tag::Heading { .. } => {
                self.block();
                self.styles.push(Style::Strong);
            }
            Tag::BlockQuote(_) => {
                self.block();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.block();
                self.in_code_block = true;
            }
            Tag::List(first) => {
                if self.lists.is_empty() {
                    self.block();
                } else {
                    self.pending_breaks = self.pending_breaks.max(1);
                }
                self.lists.push(first);
            }
            Tag::Item => {
                if !self.out.is_empty() {
                    self.pending_breaks = self.pending_breaks.max(1);
                }
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "- ".to_string(),
                };
                self.put(&format!("{}{marker}", "  ".repeat(depth)));
                self.item_head = true;
            }
            Tag::Emphasis => self.styles.push(Style::Emphasis),
            Tag::Strong => self.styles.push(Style::Strong),
            Tag::Strikethrough => self.styles.push(Style::Strike),
            Tag::Link { dest_url, .. } => self.links.push((dest_url.to_string(), self.out.len())),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) | TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::BlockQuote(_) => self.quote_depth = self.quote_depth.saturating_sub(1),
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.pending_breaks = 0;
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::Link => {
                if let Some((dest, start)) = self.links.pop() {
                    let shown = self.out.get(start..).unwrap_or_default();
                    if !dest.is_empty() && !shown.contains(dest.as_str()) {
                        self.put(&format!(" <{dest}>"));
                    }
                }
            }
            _ => {}
        }
    }

    /// A new block starts: separate it from earlier output by a blank line.
    fn block(&mut self) {
        if self.item_head || self.out.is_empty() {
            return;
        }
        self.pending_breaks = self.pending_breaks.max(2);
    }

    fn text(&mut self, text: &str) {
        let mut lines = text.split('\n');
        if let Some(first) = lines.next() {
            self.put(first);
        }
        for line in lines {
            self.pending_breaks += 1;
            self.put(line);
        }
    }

    fn put(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if self.pending_breaks > 0 {
            self.sync_styles(&[]);
            for i in 0..std::mem::take(&mut self.pending_breaks) {
                if i > 0 && self.quote_depth > 0 {
                    self.quote_prefix(false);
                }
                self.out.push('\n');
            }
            self.line_start = true;
        }
        if self.line_start {
            self.line_start = false;
            if self.quote_depth > 0 {
                self.sync_styles(&[]);
                self.quote_prefix(true);
            }
            if self.in_code_block {
                self.out.push_str(CODE_INDENT);
            }
        }
        let styles = self.styles.clone();
        self.sync_styles(&styles);
        self.out.push_str(s);
        self.item_head = false;
    }

    fn quote_prefix(&mut self, spaced: bool) {
        let bars = vec![QUOTE_BAR; self.quote_depth].join(" ");
        if self.ansi {
            self.out.push_str("\x1b[2m");
            self.out.push_str(&bars);
            self.out.push_str(RESET);
        } else {
            self.out.push_str(&bars);
        }
        if spaced {
            self.out.push(' ');
        }
    }

    fn sync_styles(&mut self, want: &[Style]) {
        if !self.ansi || self.applied == want {
            return;
        }
        if !self.applied.is_empty() {
            self.out.push_str(RESET);
        }
        for style in want {
            self.out.push_str(style.sgr());
        }
        self.applied = want.to_vec();
    }

    fn finish(mut self) -> String {
        self.sync_styles(&[]);
        self.out
    }
}
