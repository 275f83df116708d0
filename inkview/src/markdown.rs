// ABOUTME: Adapter from pulldown-cmark events to block containers of inline tokens
// ABOUTME: Each paragraph, heading, table row or code block becomes one Container

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::blocks::{ImageToken, InlineToken};

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerKind {
    Paragraph,
    Heading(u8),
    CodeBlock { language: Option<String> },
    TableRow { header: bool },
    Rule,
}

/// A block-level container and its ordered inline content
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub kind: ContainerKind,
    /// Quote and list decoration printed before the first line
    pub prefix: String,
    pub tokens: Vec<InlineToken>,
    /// Raw text of code blocks
    pub code: String,
}

impl Container {
    fn new(kind: ContainerKind, prefix: String) -> Self {
        Self {
            kind,
            prefix,
            tokens: Vec::new(),
            code: String::new(),
        }
    }
}

#[derive(Debug)]
enum Context {
    Quote,
    List { next_number: Option<u64> },
    Item { marker: Option<String> },
    Other,
}

struct ImageInProgress {
    src: String,
    title: String,
    alt: String,
    /// Images nested in the alt text that are still open
    nested: usize,
}

#[derive(Default)]
struct ContainerCollector {
    output: Vec<Container>,
    stack: Vec<Context>,
    current: Option<Container>,
    image: Option<ImageInProgress>,
}

pub fn parse(markdown: &str) -> Vec<Container> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut collector = ContainerCollector::default();

    for event in Parser::new_ext(markdown, options) {
        collector.handle(event);
    }

    collector.close_current();
    collector.output
}

impl ContainerCollector {
    fn handle(&mut self, event: Event<'_>) {
        // Everything between an image's start and end is its alt text
        if let Some(image) = self.image.as_mut() {
            match event {
                Event::Start(Tag::Image { .. }) => image.nested += 1,
                Event::End(TagEnd::Image) if image.nested > 0 => image.nested -= 1,
                Event::End(TagEnd::Image) => self.finish_image(),
                Event::Text(text) | Event::Code(text) => image.alt.push_str(&text),
                Event::SoftBreak | Event::HardBreak => image.alt.push(' '),
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.push_token(InlineToken::Text(text.to_string())),
            Event::Code(code) => self.push_token(InlineToken::Code(code.to_string())),
            Event::InlineHtml(html) | Event::Html(html) => {
                self.push_token(InlineToken::Text(html.to_string()))
            }
            Event::FootnoteReference(name) => {
                self.push_token(InlineToken::Text(format!("[^{}]", name)))
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.push_token(InlineToken::Text(marker.to_string()))
            }
            Event::SoftBreak => self.push_token(InlineToken::SoftBreak),
            Event::HardBreak => self.push_token(InlineToken::HardBreak),
            Event::Rule => {
                self.close_current();
                let prefix = self.prefix();
                self.output.push(Container::new(ContainerKind::Rule, prefix));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.open(ContainerKind::Paragraph),
            Tag::Heading { level, .. } => self.open(ContainerKind::Heading(level as u8)),
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                    _ => None,
                };
                self.open(ContainerKind::CodeBlock { language });
            }
            Tag::BlockQuote(_) => {
                self.close_current();
                self.stack.push(Context::Quote);
            }
            Tag::List(first_number) => {
                self.close_current();
                self.stack.push(Context::List {
                    next_number: first_number,
                });
            }
            Tag::Item => {
                self.close_current();
                let marker = self.next_item_marker();
                self.stack.push(Context::Item {
                    marker: Some(marker),
                });
            }
            Tag::TableHead => self.open(ContainerKind::TableRow { header: true }),
            Tag::TableRow => self.open(ContainerKind::TableRow { header: false }),
            Tag::TableCell => {
                let has_cells = self
                    .current
                    .as_ref()
                    .is_some_and(|container| !container.tokens.is_empty());
                if has_cells {
                    self.push_token(InlineToken::Text(" │ ".to_string()));
                }
            }
            Tag::Table(_) => self.close_current(),
            Tag::Emphasis => self.push_token(InlineToken::EmphasisStart),
            Tag::Strong => self.push_token(InlineToken::StrongStart),
            Tag::Strikethrough => self.push_token(InlineToken::StrikeStart),
            Tag::Link { dest_url, .. } => self.push_token(InlineToken::LinkStart {
                href: dest_url.to_string(),
            }),
            Tag::Image {
                dest_url, title, ..
            } => {
                self.image = Some(ImageInProgress {
                    src: dest_url.to_string(),
                    title: title.to_string(),
                    alt: String::new(),
                    nested: 0,
                });
            }
            _ => self.stack.push(Context::Other),
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::CodeBlock
            | TagEnd::TableHead
            | TagEnd::TableRow => self.close_current(),
            TagEnd::Table | TagEnd::TableCell | TagEnd::Image => {}
            TagEnd::Item | TagEnd::List(_) => {
                self.close_current();
                self.stack.pop();
            }
            TagEnd::Emphasis => self.push_token(InlineToken::EmphasisEnd),
            TagEnd::Strong => self.push_token(InlineToken::StrongEnd),
            TagEnd::Strikethrough => self.push_token(InlineToken::StrikeEnd),
            TagEnd::Link => self.push_token(InlineToken::LinkEnd),
            _ => {
                // Block quotes and anything pushed as Context::Other
                self.close_current();
                self.stack.pop();
            }
        }
    }

    fn open(&mut self, kind: ContainerKind) {
        self.close_current();
        let prefix = self.prefix();
        self.current = Some(Container::new(kind, prefix));
    }

    fn close_current(&mut self) {
        if let Some(container) = self.current.take() {
            self.output.push(container);
        }
    }

    fn push_token(&mut self, token: InlineToken) {
        if let Some(container) = self.current.as_mut() {
            if let ContainerKind::CodeBlock { .. } = container.kind {
                if let InlineToken::Text(text) = token {
                    container.code.push_str(&text);
                }
                return;
            }
            container.tokens.push(token);
            return;
        }

        // Tight list items carry inline content without a paragraph
        self.open(ContainerKind::Paragraph);
        if let Some(container) = self.current.as_mut() {
            container.tokens.push(token);
        }
    }

    fn finish_image(&mut self) {
        if let Some(image) = self.image.take() {
            self.push_token(InlineToken::Image(ImageToken {
                src: image.src,
                alt: image.alt,
                title: image.title,
            }));
        }
    }

    fn next_item_marker(&mut self) -> String {
        for context in self.stack.iter_mut().rev() {
            if let Context::List { next_number } = context {
                return match next_number {
                    Some(number) => {
                        let marker = format!("{}. ", number);
                        *number += 1;
                        marker
                    }
                    None => "• ".to_string(),
                };
            }
        }
        "• ".to_string()
    }

    /// Decoration for the next container; consumes pending item markers
    fn prefix(&mut self) -> String {
        let mut prefix = String::new();
        let item_count = self
            .stack
            .iter()
            .filter(|context| matches!(context, Context::Item { .. }))
            .count();
        let mut items_seen = 0;

        for context in self.stack.iter_mut() {
            match context {
                Context::Quote => prefix.push_str("> "),
                Context::Item { marker } => {
                    items_seen += 1;
                    let innermost = items_seen == item_count;
                    match marker.take() {
                        Some(marker) if innermost => prefix.push_str(&marker),
                        Some(marker) => {
                            prefix.push_str(&" ".repeat(marker.chars().count()));
                        }
                        None => prefix.push_str("  "),
                    }
                }
                Context::List { .. } | Context::Other => {}
            }
        }

        prefix
    }
}
