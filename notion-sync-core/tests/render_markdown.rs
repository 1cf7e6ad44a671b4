use notion_sync_core::contract::RenderContext;
use notion_sync_core::model::{Block, BlockKind, Row};
use notion_sync_core::render::{MarkdownRenderer, MAX_RENDER_DEPTH};

/// Context that accepts rows of one collection whose id is in an allow-list.
struct FixedContext {
    collection_id: &'static str,
    published: Vec<&'static str>,
}

impl RenderContext for FixedContext {
    fn contains_row(&self, row: &Row) -> bool {
        row.collection_id == self.collection_id
            && self.published.iter().any(|id| *id == row.id.as_str())
    }

    fn link_for(&self, row: &Row) -> String {
        format!("/posts/{}", row.id)
    }
}

fn context() -> FixedContext {
    FixedContext {
        collection_id: "root",
        published: vec!["linked"],
    }
}

fn text(id: &str, title: &str) -> Block {
    Block::new(id, BlockKind::Text { title: title.into() })
}

fn bullet(id: &str, title: &str, children: Vec<Block>) -> Block {
    Block::new(id, BlockKind::BulletedListItem { title: title.into() }).with_children(children)
}

#[test]
fn nested_bullets_indent_every_line_per_level() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let tree = bullet(
        "a",
        "top",
        vec![bullet("b", "middle", vec![bullet("c", "bottom", vec![])])],
    );

    let md = renderer.render(&tree, false);

    assert_eq!(md, "- top\n  - middle\n    - bottom\n    ");
    let lines: Vec<&str> = md.lines().collect();
    assert_eq!(lines[0], "- top");
    assert_eq!(lines[1], "  - middle");
    assert_eq!(lines[2], "    - bottom");
}

#[test]
fn sibling_list_items_concatenate_without_separator() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let tree = Block::new("n", BlockKind::NumberedListItem { title: "steps".into() })
        .with_children(vec![bullet("x", "one", vec![]), bullet("y", "two", vec![])]);

    assert_eq!(renderer.render(&tree, false), "1. steps\n  - one\n    - two\n  ");
}

#[test]
fn hidden_children_leave_no_indented_line() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let hidden = Block::new(
        "ref",
        BlockKind::CollectionRow(Box::new(Row::new("draft", "root", "Draft"))),
    );

    let only_hidden = bullet("x", "x", vec![hidden.clone()]);
    assert_eq!(renderer.render(&only_hidden, false), "- x\n");

    let mixed = bullet("x", "x", vec![hidden, bullet("y", "y", vec![])]);
    assert_eq!(renderer.render(&mixed, false), "- x\n  - y\n  ");
}

#[test]
fn row_reference_outside_root_collection_renders_empty() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let mut foreign = Row::new("linked", "nested-collection", "Elsewhere");
    foreign.icon = Some("📎".into());
    let block = Block::new("ref", BlockKind::CollectionRow(Box::new(foreign)));

    assert_eq!(renderer.render(&block, false), "");
}

#[test]
fn unpublished_row_reference_renders_empty() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let draft = Row::new("draft", "root", "Draft");
    let block = Block::new("ref", BlockKind::CollectionRow(Box::new(draft)));

    assert_eq!(renderer.render(&block, false), "");
}

#[test]
fn published_row_reference_renders_link_with_icon() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let mut row = Row::new("linked", "root", "Other Post");
    assert_eq!(
        renderer.render_row(&row, false),
        "[Other Post](/posts/linked)"
    );

    row.icon = Some("🦀".into());
    let block = Block::new("ref", BlockKind::CollectionRow(Box::new(row)));
    assert_eq!(renderer.render(&block, false), "[🦀 Other Post](/posts/linked)");
}

#[test]
fn code_block_is_fenced_with_language() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let block = Block::new(
        "code",
        BlockKind::Code {
            title: "x = 1".into(),
            language: "python".into(),
        },
    );

    assert_eq!(renderer.render(&block, false), "```python\nx = 1\n```");
}

#[test]
fn simple_kinds() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let render = |kind: BlockKind| renderer.render(&Block::new("id", kind), false);

    assert_eq!(render(BlockKind::Text { title: "plain *md*".into() }), "plain *md*");
    assert_eq!(render(BlockKind::Header { title: "H".into() }), "# H");
    assert_eq!(render(BlockKind::SubHeader { title: "H".into() }), "## H");
    assert_eq!(render(BlockKind::SubSubHeader { title: "H".into() }), "### H");
    assert_eq!(
        render(BlockKind::Image { source: "https://img/x.png".into() }),
        "![](https://img/x.png)"
    );
    assert_eq!(
        render(BlockKind::Quote { title: "one\ntwo".into() }),
        "> one\n> two"
    );
    assert_eq!(render(BlockKind::Divider), "---\n");
    assert_eq!(
        render(BlockKind::Todo { title: "done".into(), checked: true }),
        "[x] done\n"
    );
    assert_eq!(
        render(BlockKind::Todo { title: "open".into(), checked: false }),
        "[ ] open\n"
    );
}

#[test]
fn todo_children_are_indented() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let block = Block::new("t", BlockKind::Todo { title: "parent".into(), checked: false })
        .with_children(vec![text("c", "detail")]);

    assert_eq!(renderer.render(&block, false), "[ ] parent\n  detail");
}

#[test]
fn columns_wrap_children_in_sections() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let block = Block::new("cl", BlockKind::ColumnList).with_children(vec![
        Block::new("c1", BlockKind::Column { ratio: Some(0.5) })
            .with_children(vec![text("a", "left"), text("b", "more")]),
        Block::new("c2", BlockKind::Column { ratio: None }).with_children(vec![text("c", "right")]),
    ]);

    assert_eq!(
        renderer.render(&block, false),
        "<section class=\"columnSplit\" style=\"display:flex;\">\n\
         <section style=\"flex: 0.5\">\nleft\nmore\n</section>\n\
         <section style=\"flex: 1\">\nright\n</section>\n\
         </section>"
    );
}

#[test]
fn collection_view_renders_empty_and_unknown_falls_back() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);

    let view = Block::new("view", BlockKind::CollectionView);
    assert_eq!(renderer.render(&view, false), "");

    let unknown = Block::new(
        "u1",
        BlockKind::Unknown {
            kind: "equation".into(),
            title: Some("e=mc^2".into()),
        },
    );
    assert_eq!(renderer.render(&unknown, false), "<equation (id=u1, title=e=mc^2)>");
}

#[test]
fn page_root_joins_children_and_skips_empty_renders() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);
    let mut page = Row::new("page", "root", "Page");
    page.children = vec![
        Block::new("h", BlockKind::Header { title: "Intro".into() }),
        Block::new("view", BlockKind::CollectionView),
        text("p", "Body text"),
        Block::new(
            "ref",
            BlockKind::CollectionRow(Box::new(Row::new("hidden", "root", "Hidden"))),
        ),
        Block::new(
            "u",
            BlockKind::Unknown {
                kind: "bookmark".into(),
                title: None,
            },
        ),
    ];

    assert_eq!(
        renderer.render_row(&page, true),
        "# Intro\n\nBody text\n\n<bookmark (id=u)>"
    );

    let as_block = Block::new("page", BlockKind::CollectionRow(Box::new(page)));
    assert_eq!(
        renderer.render(&as_block, true),
        "# Intro\n\nBody text\n\n<bookmark (id=u)>"
    );
}

#[test]
fn pathological_nesting_is_truncated() {
    let ctx = context();
    let renderer = MarkdownRenderer::new(&ctx);

    let mut tree = text("leaf", "too deep");
    for level in 0..(MAX_RENDER_DEPTH + 10) {
        tree = bullet(&format!("b{level}"), "level", vec![tree]);
    }

    let md = renderer.render(&tree, false);
    assert!(md.starts_with("- level\n  - level"));
    assert!(!md.contains("too deep"));
}
