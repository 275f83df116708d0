// ABOUTME: Rendering mount adapter: swaps resolved content into pending image blocks
// ABOUTME: Each image block settles exactly once; rendering never waits for resolution

use inkview_core::{ResolutionError, ResolvedResource};
use owo_colors::OwoColorize;

use crate::blocks::{Block, BlockId, BlockState, ImageBlock, inline_placeholder};
use crate::capability::CapabilityState;
use crate::constants::ui;
use crate::protocols::RenderOptions;

/// Blocks of one opened document, tagged with the session generation
#[derive(Debug)]
pub struct Document {
    generation: u64,
    blocks: Vec<Block>,
}

impl Document {
    pub fn new(generation: u64, blocks: Vec<Block>) -> Self {
        Self { generation, blocks }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn image(&self, id: BlockId) -> Option<&ImageBlock> {
        self.blocks.iter().find_map(|block| match block {
            Block::Image(image) if image.id == id => Some(image),
            _ => None,
        })
    }

    pub fn pending(&self) -> impl Iterator<Item = &ImageBlock> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Image(image) if image.is_pending() => Some(image),
            _ => None,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    pub fn is_settled(&self) -> bool {
        self.pending_count() == 0
    }

    /// Mount a resolution outcome into a pending block. Returns false (and
    /// changes nothing) if the block is unknown or already settled.
    pub fn mount(
        &mut self,
        id: BlockId,
        outcome: &ResolvedResource,
        capability: &CapabilityState,
        options: &RenderOptions,
    ) -> bool {
        let Some(block) = self.blocks.iter_mut().find_map(|block| match block {
            Block::Image(image) if image.id == id => Some(image),
            _ => None,
        }) else {
            log::debug!("Ignoring mount for unknown block {:?}", id);
            return false;
        };

        if !block.is_pending() {
            log::debug!("Ignoring mount for settled block {:?}", id);
            return false;
        }

        let state = match (outcome, capability.factory()) {
            (Ok(image), Some(factory)) => match factory.render(image, options) {
                Ok(renderable) => BlockState::Resolved(renderable),
                Err(e) => {
                    log::debug!("{} cannot render {}: {}", factory.name(), image.identity, e);
                    let err = ResolutionError::Unsupported(e.to_string());
                    BlockState::Failed(failure_text(block.caption(), &err))
                }
            },
            (Ok(_), None) => BlockState::Failed(failure_text(
                block.caption(),
                &ResolutionError::Unsupported(
                    capability.reason().unwrap_or("no image support").to_string(),
                ),
            )),
            (Err(err), _) => BlockState::Failed(failure_text(block.caption(), err)),
        };

        block.state = state;
        true
    }

    /// Terminal output for the document in its current state
    pub fn render(&self, use_color: bool) -> String {
        self.blocks
            .iter()
            .map(|block| render_block(block, use_color))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Placeholder text for an image that will not be shown
pub fn failure_text(caption: &str, err: &ResolutionError) -> String {
    format!("{} ({})", inline_placeholder(caption), err.short_reason())
}

fn render_block(block: &Block, use_color: bool) -> String {
    match block {
        Block::Text(text) => text.clone(),
        Block::Placeholder(text) => dim(text, use_color),
        Block::Image(image) => render_image(image, use_color),
    }
}

fn render_image(image: &ImageBlock, use_color: bool) -> String {
    let mut output = image.prefix.clone();
    match &image.state {
        BlockState::Pending => output.push_str(&dim(&inline_placeholder(image.caption()), use_color)),
        BlockState::Resolved(renderable) => output.push_str(&renderable.payload),
        BlockState::Failed(text) => output.push_str(&dim(text, use_color)),
    }

    if let Some(href) = &image.link_href {
        let indent = " ".repeat(image.prefix.chars().count());
        let link = format!("{} {}", ui::LINK_MARKER, href);
        let link = if use_color {
            link.blue().underline().to_string()
        } else {
            link
        };
        output.push('\n');
        output.push_str(&indent);
        output.push_str(&link);
    }

    output
}

fn dim(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}
