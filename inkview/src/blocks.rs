// ABOUTME: Block decision engine: decides whether an image becomes its own block
// ABOUTME: Classifies containers as ImageOnly, Mixed or PlainText and builds blocks

use inkview_core::{ImageReference, Location};
use owo_colors::OwoColorize;

use crate::capability::CapabilityState;
use crate::constants::ui;
use crate::markdown::{Container, ContainerKind};
use crate::protocols::Renderable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageToken {
    pub src: String,
    pub alt: String,
    pub title: String,
}

impl ImageToken {
    pub fn caption(&self) -> &str {
        [&self.alt, &self.title, &self.src]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("image")
    }
}

/// Inline content handed over by the parser, one variant per token kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineToken {
    Text(String),
    Code(String),
    SoftBreak,
    HardBreak,
    Image(ImageToken),
    LinkStart { href: String },
    LinkEnd,
    EmphasisStart,
    EmphasisEnd,
    StrongStart,
    StrongEnd,
    StrikeStart,
    StrikeEnd,
}

impl InlineToken {
    /// Whether this token is visible content (as opposed to structure)
    fn is_content(&self) -> bool {
        match self {
            InlineToken::Text(text) | InlineToken::Code(text) => !text.trim().is_empty(),
            InlineToken::Image(_) => true,
            InlineToken::SoftBreak
            | InlineToken::HardBreak
            | InlineToken::LinkStart { .. }
            | InlineToken::LinkEnd
            | InlineToken::EmphasisStart
            | InlineToken::EmphasisEnd
            | InlineToken::StrongStart
            | InlineToken::StrongEnd
            | InlineToken::StrikeStart
            | InlineToken::StrikeEnd => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Exactly one image and nothing else visible; index into the tokens
    ImageOnly(usize),
    Mixed,
    PlainText,
}

pub fn classify(tokens: &[InlineToken]) -> Classification {
    let mut image_index = None;
    let mut image_count = 0;
    let mut other_content = false;

    for (index, token) in tokens.iter().enumerate() {
        match token {
            InlineToken::Image(_) => {
                image_count += 1;
                image_index.get_or_insert(index);
            }
            token if token.is_content() => other_content = true,
            _ => {}
        }
    }

    match (image_count, image_index) {
        (0, _) => Classification::PlainText,
        (1, Some(index)) if !other_content => Classification::ImageOnly(index),
        _ => Classification::Mixed,
    }
}

/// Href of the link enclosing the token at `index`, if any
fn enclosing_link(tokens: &[InlineToken], index: usize) -> Option<String> {
    let mut links: Vec<&str> = Vec::new();
    for token in &tokens[..index] {
        match token {
            InlineToken::LinkStart { href } => links.push(href),
            InlineToken::LinkEnd => {
                links.pop();
            }
            _ => {}
        }
    }
    links.last().map(|href| href.to_string())
}

/// Inline placeholder used wherever an image cannot be its own block
pub fn inline_placeholder(caption: &str) -> String {
    format!("{} [{}]", ui::IMAGE_GLYPH, caption)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Style {
    emphasis: u32,
    strong: u32,
    strike: u32,
}

/// Render inline tokens as terminal text; images become placeholders
pub fn render_inline(tokens: &[InlineToken], use_color: bool) -> String {
    let mut output = String::new();
    let mut style = Style::default();

    for token in tokens {
        match token {
            InlineToken::Text(text) => output.push_str(&apply_style(text, style, use_color)),
            InlineToken::Code(code) => {
                if use_color {
                    output.push_str(&code.cyan().to_string());
                } else {
                    output.push('`');
                    output.push_str(code);
                    output.push('`');
                }
            }
            InlineToken::SoftBreak => output.push(' '),
            InlineToken::HardBreak => output.push('\n'),
            InlineToken::Image(image) => {
                let placeholder = inline_placeholder(image.caption());
                if use_color {
                    output.push_str(&placeholder.dimmed().to_string());
                } else {
                    output.push_str(&placeholder);
                }
            }
            InlineToken::LinkStart { .. } => {}
            InlineToken::LinkEnd => {}
            InlineToken::EmphasisStart => style.emphasis += 1,
            InlineToken::EmphasisEnd => style.emphasis = style.emphasis.saturating_sub(1),
            InlineToken::StrongStart => style.strong += 1,
            InlineToken::StrongEnd => style.strong = style.strong.saturating_sub(1),
            InlineToken::StrikeStart => style.strike += 1,
            InlineToken::StrikeEnd => style.strike = style.strike.saturating_sub(1),
        }
    }

    output
}

fn apply_style(text: &str, style: Style, use_color: bool) -> String {
    if !use_color {
        return text.to_string();
    }
    let mut styled = text.to_string();
    if style.emphasis > 0 {
        styled = styled.italic().to_string();
    }
    if style.strong > 0 {
        styled = styled.bold().to_string();
    }
    if style.strike > 0 {
        styled = styled.strikethrough().to_string();
    }
    styled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Lifecycle of an image block: Pending, then Resolved or Failed exactly once
#[derive(Debug, Clone, PartialEq)]
pub enum BlockState {
    Pending,
    Resolved(Renderable),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    pub id: BlockId,
    pub reference: ImageReference,
    pub prefix: String,
    pub link_href: Option<String>,
    pub state: BlockState,
}

impl ImageBlock {
    pub fn caption(&self) -> &str {
        self.reference.caption()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, BlockState::Pending)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Already rendered text (plain paragraphs, mixed content, headings, code)
    Text(String),
    /// Terminal image placeholder, settled at parse time
    Placeholder(String),
    /// Image awaiting resolution and mount
    Image(ImageBlock),
}

/// Builds blocks from containers, consulting the capability for image-only ones
pub struct BlockBuilder {
    capability: CapabilityState,
    location: Location,
    use_color: bool,
}

impl BlockBuilder {
    pub fn new(capability: CapabilityState, location: Location, use_color: bool) -> Self {
        Self {
            capability,
            location,
            use_color,
        }
    }

    pub fn build_all(&self, containers: &[Container]) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::with_capacity(containers.len());
        let mut in_table = false;

        for (index, container) in containers.iter().enumerate() {
            let block = self.build(BlockId(index), container);
            let is_row = matches!(container.kind, ContainerKind::TableRow { .. });

            // Rows of one table share a block so they print without gaps
            if in_table && is_row {
                if let (Some(Block::Text(table)), Block::Text(row)) = (blocks.last_mut(), &block) {
                    table.push('\n');
                    table.push_str(row);
                    continue;
                }
            }
            blocks.push(block);
            in_table = is_row;
        }

        blocks
    }

    pub fn build(&self, id: BlockId, container: &Container) -> Block {
        match &container.kind {
            ContainerKind::Paragraph => self.build_paragraph(id, container),
            ContainerKind::Heading(level) => Block::Text(self.heading(*level, container)),
            ContainerKind::CodeBlock { .. } => Block::Text(self.code_block(container)),
            ContainerKind::TableRow { header } => {
                let text = render_inline(&container.tokens, self.use_color);
                let text = if *header && self.use_color {
                    text.bold().to_string()
                } else {
                    text
                };
                Block::Text(format!("{}{}", container.prefix, text))
            }
            ContainerKind::Rule => Block::Text(format!(
                "{}{}",
                container.prefix,
                "─".repeat(ui::RULE_WIDTH)
            )),
        }
    }

    fn build_paragraph(&self, id: BlockId, container: &Container) -> Block {
        let index = match classify(&container.tokens) {
            Classification::ImageOnly(index) => index,
            Classification::Mixed | Classification::PlainText => {
                let text = render_inline(&container.tokens, self.use_color);
                return Block::Text(format!("{}{}", container.prefix, text));
            }
        };

        let InlineToken::Image(image) = &container.tokens[index] else {
            return Block::Text(render_inline(&container.tokens, self.use_color));
        };

        match &self.capability {
            CapabilityState::Unavailable(reason) => Block::Placeholder(format!(
                "{}{} ({})",
                container.prefix,
                inline_placeholder(image.caption()),
                reason
            )),
            CapabilityState::Available(_) => {
                let reference = ImageReference::new(&image.src, &image.alt, self.location.clone())
                    .with_title(&image.title);
                Block::Image(ImageBlock {
                    id,
                    reference,
                    prefix: container.prefix.clone(),
                    link_href: enclosing_link(&container.tokens, index),
                    state: BlockState::Pending,
                })
            }
        }
    }

    fn heading(&self, level: u8, container: &Container) -> String {
        let text = render_inline(&container.tokens, false);
        let marker = "#".repeat(level as usize);
        let line = format!("{}{} {}", container.prefix, marker, text);
        if self.use_color {
            line.bold().to_string()
        } else {
            line
        }
    }

    fn code_block(&self, container: &Container) -> String {
        container
            .code
            .trim_end_matches('\n')
            .lines()
            .map(|line| {
                let line = format!("{}    {}", container.prefix, line);
                if self.use_color {
                    line.yellow().to_string()
                } else {
                    line
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
