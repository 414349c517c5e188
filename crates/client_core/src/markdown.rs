use pulldown_cmark::{html, Options, Parser};

/// Markdown source -> HTML markup for a node's text display.
pub fn render(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(text, options);
    let mut markup = String::with_capacity(text.len() + text.len() / 2);
    html::push_html(&mut markup, parser);
    markup
}

/// Markup shown in place of a node's text while it is being regenerated.
pub fn placeholder(frame: &str) -> String {
    format!("<p class=\"ticker\">{frame}</p>")
}
