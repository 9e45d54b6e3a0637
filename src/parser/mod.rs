use pulldown_cmark::{Event, Options, Parser, Tag};

/// Flatten markdown to plain text.
///
/// Block elements (headings, paragraphs, list items, code blocks, table rows)
/// end up separated by blank lines; inline markup is dropped but its text is
/// kept. Link targets and images are not included.
pub fn markdown_to_text(content: &str) -> String {
    // Initialize parser with the extensions the corpus uses
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_image = false;

    let mut flush = |current: &mut String| {
        let block = current.trim();
        if !block.is_empty() {
            blocks.push(block.to_string());
        }
        current.clear();
    };

    for event in Parser::new_ext(content, options) {
        match event {
            Event::Start(Tag::Image(..)) => in_image = true,
            Event::End(Tag::Image(..)) => in_image = false,
            Event::Start(Tag::Heading(..))
            | Event::Start(Tag::Paragraph)
            | Event::Start(Tag::Item)
            | Event::Start(Tag::CodeBlock(_))
            | Event::Start(Tag::TableRow)
            | Event::Start(Tag::TableHead) => flush(&mut current),
            Event::End(Tag::Heading(..))
            | Event::End(Tag::Paragraph)
            | Event::End(Tag::Item)
            | Event::End(Tag::CodeBlock(_))
            | Event::End(Tag::TableRow)
            | Event::End(Tag::TableHead) => flush(&mut current),
            Event::End(Tag::TableCell) => current.push(' '),
            Event::Text(text) | Event::Code(text) if !in_image => current.push_str(&text),
            Event::SoftBreak => current.push(' '),
            Event::HardBreak => current.push('\n'),
            _ => {}
        }
    }
    flush(&mut current);

    blocks.join("\n\n")
}
