//! Block tree to markdown.
//!
//! [`MarkdownRenderer`] walks a page's blocks recursively and produces markdown text.
//! Every [`BlockKind`] has exactly one rendering rule. Unsupported and unknown kinds
//! produce a diagnostic and a harmless fallback instead of failing, so one odd block
//! never costs the rest of the page.
//!
//! References to other rows are resolved through a [`RenderContext`], which decides
//! whether the referenced row is in scope (published, in the tracked collection) and
//! what it links to.

use tracing::{error, warn};

use crate::contract::RenderContext;
use crate::model::{Block, BlockKind, Row};

/// Nesting depth beyond which subtrees are dropped.
pub const MAX_RENDER_DEPTH: usize = 64;

const INDENT: &str = "  ";

pub struct MarkdownRenderer<'a, C: RenderContext + ?Sized> {
    context: &'a C,
}

impl<'a, C: RenderContext + ?Sized> MarkdownRenderer<'a, C> {
    pub fn new(context: &'a C) -> Self {
        Self { context }
    }

    /// Render a single block. `is_page_root` only matters for row blocks: a root row
    /// renders its content, any other row renders as a link.
    pub fn render(&self, block: &Block, is_page_root: bool) -> String {
        self.render_at(block, is_page_root, 0)
    }

    /// Render a row, either as a page body or as a link to it.
    pub fn render_row(&self, row: &Row, is_page_root: bool) -> String {
        self.render_row_at(row, is_page_root, 0)
    }

    fn render_row_at(&self, row: &Row, is_page_root: bool, depth: usize) -> String {
        if is_page_root {
            return row
                .children
                .iter()
                .map(|child| self.render_at(child, false, depth + 1))
                .filter(|md| !md.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        if !self.context.contains_row(row) {
            return String::new();
        }
        format!("[{}]({})", row.decorated_title(), self.context.link_for(row))
    }

    fn render_at(&self, block: &Block, is_page_root: bool, depth: usize) -> String {
        if depth > MAX_RENDER_DEPTH {
            error!(
                block_id = %block.id,
                max_depth = MAX_RENDER_DEPTH,
                "Block nesting too deep, dropping subtree"
            );
            return String::new();
        }

        match &block.kind {
            BlockKind::CollectionRow(row) => self.render_row_at(row, is_page_root, depth),
            BlockKind::Text { title } => title.clone(),
            BlockKind::Header { title } => format!("# {title}"),
            BlockKind::SubHeader { title } => format!("## {title}"),
            BlockKind::SubSubHeader { title } => format!("### {title}"),
            BlockKind::BulletedListItem { title } => {
                format!("- {title}\n{}", self.indent_children(&block.children, depth))
            }
            BlockKind::NumberedListItem { title } => {
                format!("1. {title}\n{}", self.indent_children(&block.children, depth))
            }
            BlockKind::ColumnList => format!(
                "<section class=\"columnSplit\" style=\"display:flex;\">\n{}\n</section>",
                self.join_children(&block.children, depth)
            ),
            BlockKind::Column { ratio } => format!(
                "<section style=\"flex: {}\">\n{}\n</section>",
                ratio.unwrap_or(1.0),
                self.join_children(&block.children, depth)
            ),
            BlockKind::Image { source } => format!("![]({source})"),
            BlockKind::Code { title, language } => format!("```{language}\n{title}\n```"),
            BlockKind::Quote { title } => format!("> {}", title.split('\n').collect::<Vec<_>>().join("\n> ")),
            BlockKind::Todo { title, checked } => format!(
                "[{}] {title}\n{}",
                if *checked { "x" } else { " " },
                self.indent_children(&block.children, depth)
            ),
            BlockKind::Divider => "---\n".to_string(),
            BlockKind::CollectionView => {
                warn!(block_id = %block.id, "Nested collection views are not rendered");
                String::new()
            }
            BlockKind::Unknown { kind, .. } => {
                warn!(block_id = %block.id, kind = %kind, "Encountered unknown block type");
                block.to_string()
            }
        }
    }

    /// Children joined by newlines, unindented. Used by column containers.
    fn join_children(&self, children: &[Block], depth: usize) -> String {
        children
            .iter()
            .map(|child| self.render_at(child, false, depth + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every line of every child indented by two spaces, children concatenated directly.
    fn indent_children(&self, children: &[Block], depth: usize) -> String {
        children
            .iter()
            .map(|child| self.render_at(child, false, depth + 1))
            .filter(|md| !md.is_empty())
            .map(|md| format!("{INDENT}{}", md.replace('\n', &format!("\n{INDENT}"))))
            .collect()
    }
}
