//! Rich-text document model behind the card editor toolbar.
//!
//! The editor keeps the document as a flat list of rows (text blocks, list
//! items and images). Lists exist only in the tree view returned by
//! [`Editor::document`], where consecutive list items of the same kind are
//! grouped. A selection is an inclusive range of row indices.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkFormat {
    Bold,
    Italic,
    Underline,
    Code,
    Color,
    FontSize,
    BackgroundColor,
}

/// A mark together with its value, as applied by the toolbar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "camelCase")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Code,
    Color(String),
    FontSize(String),
    BackgroundColor(String),
}

impl Mark {
    pub fn format(&self) -> MarkFormat {
        match self {
            Mark::Bold => MarkFormat::Bold,
            Mark::Italic => MarkFormat::Italic,
            Mark::Underline => MarkFormat::Underline,
            Mark::Code => MarkFormat::Code,
            Mark::Color(_) => MarkFormat::Color,
            Mark::FontSize(_) => MarkFormat::FontSize,
            Mark::BackgroundColor(_) => MarkFormat::BackgroundColor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockFormat {
    HeadingOne,
    HeadingTwo,
    Paragraph,
    BlockQuote,
    NumberedList,
    BulletedList,
}

impl BlockFormat {
    fn list_kind(self) -> Option<ListKind> {
        match self {
            BlockFormat::NumberedList => Some(ListKind::Numbered),
            BlockFormat::BulletedList => Some(ListKind::Bulleted),
            _ => None,
        }
    }

    fn text_kind(self) -> TextKind {
        match self {
            BlockFormat::HeadingOne => TextKind::HeadingOne,
            BlockFormat::HeadingTwo => TextKind::HeadingTwo,
            BlockFormat::BlockQuote => TextKind::BlockQuote,
            BlockFormat::Paragraph => TextKind::Paragraph,
            BlockFormat::NumberedList | BlockFormat::BulletedList => TextKind::ListItem,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
    Justify,
}

impl Align {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Align::Left),
            "center" => Some(Align::Center),
            "right" => Some(Align::Right),
            "justify" => Some(Align::Justify),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
            Align::Justify => "justify",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marks {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

impl Marks {
    pub fn has(&self, format: MarkFormat) -> bool {
        match format {
            MarkFormat::Bold => self.bold,
            MarkFormat::Italic => self.italic,
            MarkFormat::Underline => self.underline,
            MarkFormat::Code => self.code,
            MarkFormat::Color => self.color.is_some(),
            MarkFormat::FontSize => self.font_size.is_some(),
            MarkFormat::BackgroundColor => self.background_color.is_some(),
        }
    }

    pub fn add(&mut self, mark: &Mark) {
        match mark {
            Mark::Bold => self.bold = true,
            Mark::Italic => self.italic = true,
            Mark::Underline => self.underline = true,
            Mark::Code => self.code = true,
            Mark::Color(v) => self.color = Some(v.clone()),
            Mark::FontSize(v) => self.font_size = Some(v.clone()),
            Mark::BackgroundColor(v) => self.background_color = Some(v.clone()),
        }
    }

    pub fn remove(&mut self, format: MarkFormat) {
        match format {
            MarkFormat::Bold => self.bold = false,
            MarkFormat::Italic => self.italic = false,
            MarkFormat::Underline => self.underline = false,
            MarkFormat::Code => self.code = false,
            MarkFormat::Color => self.color = None,
            MarkFormat::FontSize => self.font_size = None,
            MarkFormat::BackgroundColor => self.background_color = None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub text: String,
    #[serde(flatten)]
    pub marks: Marks,
}

impl Leaf {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextKind {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    BlockQuote,
    ListItem,
}

impl TextKind {
    fn tag(self) -> &'static str {
        match self {
            TextKind::Paragraph => "p",
            TextKind::HeadingOne => "h1",
            TextKind::HeadingTwo => "h2",
            TextKind::BlockQuote => "blockquote",
            TextKind::ListItem => "li",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub kind: TextKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    /// Never empty; an empty block holds one empty leaf.
    pub children: Vec<Leaf>,
}

impl TextBlock {
    pub fn new(kind: TextKind, children: Vec<Leaf>) -> Self {
        let children = if children.is_empty() {
            vec![Leaf::default()]
        } else {
            children
        };
        Self {
            kind,
            align: None,
            children,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(TextKind::Paragraph, vec![Leaf::plain(text)])
    }

    pub fn text(&self) -> String {
        self.children.iter().map(|l| l.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Numbered,
    Bulleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "block", rename_all = "kebab-case")]
pub enum Block {
    Text(TextBlock),
    List { kind: ListKind, items: Vec<TextBlock> },
    Image { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RowBlock {
    Text(TextBlock),
    Image(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    block: RowBlock,
    /// Set exactly when the row is a list item.
    list: Option<ListKind>,
}

impl Row {
    fn text(block: TextBlock) -> Self {
        Self {
            block: RowBlock::Text(block),
            list: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub focus: usize,
}

impl Selection {
    fn range(self) -> std::ops::RangeInclusive<usize> {
        self.anchor.min(self.focus)..=self.anchor.max(self.focus)
    }
}

/// One toolbar action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Command {
    ToggleMark { mark: Mark },
    SetMark { mark: Mark },
    ToggleBlock { format: BlockFormat },
    InsertImage { url: String },
    SetTextAlign { align: Align },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    rows: Vec<Row>,
    selection: Option<Selection>,
}

impl Default for Editor {
    fn default() -> Self {
        Self {
            rows: vec![Row::text(TextBlock::paragraph(""))],
            selection: None,
        }
    }
}

impl Editor {
    pub fn from_document(doc: Document) -> Self {
        let mut rows = Vec::new();
        for block in doc.blocks {
            match block {
                Block::Text(mut tb) => {
                    if tb.kind == TextKind::ListItem {
                        tb.kind = TextKind::Paragraph;
                    }
                    rows.push(Row::text(tb));
                }
                Block::List { kind, items } => {
                    for mut item in items {
                        item.kind = TextKind::ListItem;
                        rows.push(Row {
                            block: RowBlock::Text(item),
                            list: Some(kind),
                        });
                    }
                }
                Block::Image { url } => rows.push(Row {
                    block: RowBlock::Image(url),
                    list: None,
                }),
            }
        }
        if rows.is_empty() {
            return Self::default();
        }
        Self {
            rows,
            selection: None,
        }
    }

    pub fn from_html(html: &str) -> Self {
        Self::from_document(html_to_document(html))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Select rows `anchor..=focus`, clamped to the document.
    pub fn select(&mut self, anchor: usize, focus: usize) {
        let last = self.rows.len().saturating_sub(1);
        self.selection = Some(Selection {
            anchor: anchor.min(last),
            focus: focus.min(last),
        });
    }

    pub fn select_all(&mut self) {
        self.select(0, usize::MAX);
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn selected_rows(&self) -> std::ops::RangeInclusive<usize> {
        match self.selection {
            Some(sel) => sel.range(),
            #[allow(clippy::reversed_empty_ranges)]
            None => 1..=0,
        }
    }

    fn selected_text_blocks(&self) -> impl Iterator<Item = &TextBlock> {
        self.rows[self.selected_rows()]
            .iter()
            .filter_map(|r| match &r.block {
                RowBlock::Text(tb) => Some(tb),
                RowBlock::Image(_) => None,
            })
    }

    fn for_each_selected_text<F: FnMut(&mut TextBlock, &mut Option<ListKind>)>(&mut self, mut f: F) {
        let range = self.selected_rows();
        for row in &mut self.rows[range] {
            if let RowBlock::Text(tb) = &mut row.block {
                f(tb, &mut row.list);
            }
        }
    }

    /// Every selected leaf carries the mark. Empty leaves are ignored unless
    /// the selection holds nothing else.
    pub fn is_mark_active(&self, format: MarkFormat) -> bool {
        let leaves: Vec<&Leaf> = self
            .selected_text_blocks()
            .flat_map(|tb| tb.children.iter())
            .collect();
        let non_empty: Vec<&&Leaf> = leaves.iter().filter(|l| !l.text.is_empty()).collect();
        if non_empty.is_empty() {
            return !leaves.is_empty() && leaves.iter().all(|l| l.marks.has(format));
        }
        non_empty.iter().all(|l| l.marks.has(format))
    }

    pub fn toggle_mark(&mut self, mark: &Mark) {
        if self.is_mark_active(mark.format()) {
            let format = mark.format();
            self.for_each_selected_text(|tb, _| {
                tb.children.iter_mut().for_each(|l| l.marks.remove(format))
            });
        } else {
            self.set_mark(mark);
        }
        self.normalize();
    }

    pub fn set_mark(&mut self, mark: &Mark) {
        self.for_each_selected_text(|tb, _| tb.children.iter_mut().for_each(|l| l.marks.add(mark)));
        self.normalize();
    }

    pub fn is_block_active(&self, format: BlockFormat) -> bool {
        let range = self.selected_rows();
        self.rows[range].iter().any(|row| match (&row.block, format.list_kind()) {
            (RowBlock::Text(_), Some(kind)) => row.list == Some(kind),
            (RowBlock::Text(tb), None) => tb.kind == format.text_kind(),
            (RowBlock::Image(_), _) => false,
        })
    }

    pub fn toggle_block(&mut self, format: BlockFormat) {
        let active = self.is_block_active(format);
        let list = format.list_kind();
        self.for_each_selected_text(|tb, row_list| {
            *row_list = None;
            tb.kind = match (active, list) {
                (true, _) => TextKind::Paragraph,
                (false, Some(_)) => TextKind::ListItem,
                (false, None) => format.text_kind(),
            };
            if !active {
                *row_list = list;
            }
        });
    }

    /// Insert an image after the selection (or at the end) and select it.
    pub fn insert_image(&mut self, url: &str) {
        let at = match self.selection {
            Some(sel) => *sel.range().end() + 1,
            None => self.rows.len(),
        };
        self.rows.insert(
            at,
            Row {
                block: RowBlock::Image(url.to_string()),
                list: None,
            },
        );
        self.selection = Some(Selection {
            anchor: at,
            focus: at,
        });
    }

    pub fn set_text_align(&mut self, align: Align) {
        self.for_each_selected_text(|tb, _| tb.align = Some(align));
    }

    pub fn apply(&mut self, command: &Command) {
        match command {
            Command::ToggleMark { mark } => self.toggle_mark(mark),
            Command::SetMark { mark } => self.set_mark(mark),
            Command::ToggleBlock { format } => self.toggle_block(*format),
            Command::InsertImage { url } => self.insert_image(url),
            Command::SetTextAlign { align } => self.set_text_align(*align),
        }
    }

    /// Merge adjacent leaves that ended up with identical marks.
    fn normalize(&mut self) {
        for row in &mut self.rows {
            if let RowBlock::Text(tb) = &mut row.block {
                let mut merged: Vec<Leaf> = Vec::with_capacity(tb.children.len());
                for leaf in tb.children.drain(..) {
                    match merged.last_mut() {
                        Some(prev) if prev.marks == leaf.marks => prev.text.push_str(&leaf.text),
                        _ => merged.push(leaf),
                    }
                }
                tb.children = merged;
            }
        }
    }

    pub fn document(&self) -> Document {
        let mut blocks: Vec<Block> = Vec::new();
        for row in &self.rows {
            match (&row.block, row.list) {
                (RowBlock::Text(tb), Some(kind)) => match blocks.last_mut() {
                    Some(Block::List { kind: k, items }) if *k == kind => items.push(tb.clone()),
                    _ => blocks.push(Block::List {
                        kind,
                        items: vec![tb.clone()],
                    }),
                },
                (RowBlock::Text(tb), None) => blocks.push(Block::Text(tb.clone())),
                (RowBlock::Image(url), _) => blocks.push(Block::Image { url: url.clone() }),
            }
        }
        Document { blocks }
    }

    pub fn to_html(&self) -> String {
        document_to_html(&self.document())
    }
}

/// Body of `POST /editor/apply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub html: String,
    pub anchor: usize,
    pub focus: usize,
    #[serde(default)]
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResponse {
    pub html: String,
    pub document: Document,
    pub selection: Option<Selection>,
}

pub fn apply_commands(req: &EditRequest) -> EditResponse {
    let mut editor = Editor::from_html(&req.html);
    editor.select(req.anchor, req.focus);
    for command in &req.commands {
        editor.apply(command);
    }
    EditResponse {
        html: editor.to_html(),
        document: editor.document(),
        selection: editor.selection(),
    }
}

pub fn document_to_html(doc: &Document) -> String {
    let mut out = String::new();
    for block in &doc.blocks {
        match block {
            Block::Text(tb) => push_text_block(&mut out, tb),
            Block::List { kind, items } => {
                let tag = match kind {
                    ListKind::Numbered => "ol",
                    ListKind::Bulleted => "ul",
                };
                out.push_str(&format!("<{}>", tag));
                for item in items {
                    push_text_block(&mut out, item);
                }
                out.push_str(&format!("</{}>", tag));
            }
            Block::Image { url } => {
                out.push_str(&format!(
                    "<img src=\"{}\" alt=\"\">",
                    html_escape::encode_double_quoted_attribute(url)
                ));
            }
        }
    }
    out
}

fn push_text_block(out: &mut String, tb: &TextBlock) {
    let tag = tb.kind.tag();
    match tb.align {
        Some(align) => out.push_str(&format!("<{} style=\"text-align:{}\">", tag, align.as_str())),
        None => out.push_str(&format!("<{}>", tag)),
    }
    for leaf in &tb.children {
        out.push_str(&leaf_to_html(leaf));
    }
    out.push_str(&format!("</{}>", tag));
}

fn leaf_to_html(leaf: &Leaf) -> String {
    let m = &leaf.marks;
    let mut text = html_escape::encode_text(&leaf.text).to_string();
    if m.bold {
        text = format!("<strong>{}</strong>", text);
    }
    if m.italic {
        text = format!("<em>{}</em>", text);
    }
    if m.underline {
        text = format!("<u>{}</u>", text);
    }
    if m.code {
        text = format!("<code>{}</code>", text);
    }
    let style = |prop: &str, v: &str, inner: String| {
        format!(
            "<span style=\"{}:{}\">{}</span>",
            prop,
            html_escape::encode_double_quoted_attribute(v),
            inner
        )
    };
    if let Some(c) = &m.color {
        text = style("color", c, text);
    }
    if let Some(s) = &m.font_size {
        text = style("font-size", s, text);
    }
    if let Some(b) = &m.background_color {
        text = style("background-color", b, text);
    }
    text
}

// ---------------------------------------------------------------------------
// HTML import

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Open { name: String, attrs: &'a str },
    Close(String),
    Text(&'a str),
}

/// Split markup into tags and text. Comments, doctypes and the bodies of
/// `script`/`style`/`head` are dropped.
fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let lower = html.to_ascii_lowercase();
    let bytes = html.as_bytes();
    let mut i = 0;
    let mut text_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        // `<` followed by anything else (as in `1 < 2`) is literal text
        let starts_markup = bytes
            .get(i + 1)
            .map_or(false, |&c| c.is_ascii_alphabetic() || matches!(c, b'/' | b'!' | b'?'));
        if !starts_markup {
            i += 1;
            continue;
        }
        if text_start < i {
            tokens.push(Token::Text(&html[text_start..i]));
        }
        if lower[i..].starts_with("<!--") {
            i = lower[i..].find("-->").map_or(bytes.len(), |off| i + off + 3);
            text_start = i;
            continue;
        }
        // find the closing '>' outside of quotes
        let mut j = i + 1;
        let mut quote: Option<u8> = None;
        while j < bytes.len() {
            match (quote, bytes[j]) {
                (None, b'"') | (None, b'\'') => quote = Some(bytes[j]),
                (Some(q), c) if c == q => quote = None,
                (None, b'>') => break,
                _ => {}
            }
            j += 1;
        }
        let inner = &html[i + 1..j.min(bytes.len())];
        i = (j + 1).min(bytes.len());
        text_start = i;

        if inner.starts_with('!') || inner.starts_with('?') {
            continue;
        }
        if let Some(name) = inner.strip_prefix('/') {
            tokens.push(Token::Close(name.trim().to_ascii_lowercase()));
            continue;
        }
        let name_end = inner
            .find(|c: char| c.is_whitespace() || c == '/')
            .unwrap_or(inner.len());
        let name = inner[..name_end].to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        if matches!(name.as_str(), "script" | "style" | "head" | "title") {
            let close = format!("</{}", name);
            i = lower[i..].find(&close).map_or(bytes.len(), |off| {
                let end = i + off;
                lower[end..].find('>').map_or(bytes.len(), |g| end + g + 1)
            });
            text_start = i;
            continue;
        }
        tokens.push(Token::Open {
            name,
            attrs: inner[name_end..].trim_end_matches('/'),
        });
    }
    if text_start < bytes.len() {
        tokens.push(Token::Text(&html[text_start..]));
    }
    tokens
}

fn attr_value(attrs: &str, key: &str) -> Option<String> {
    let lower = attrs.to_ascii_lowercase();
    let mut search = 0;
    while let Some(off) = lower[search..].find(key) {
        let pos = search + off;
        search = pos + key.len();
        let boundary_ok = pos == 0
            || lower.as_bytes()[pos - 1].is_ascii_whitespace();
        let rest = attrs[pos + key.len()..].trim_start();
        if !boundary_ok || !rest.starts_with('=') {
            continue;
        }
        let rest = rest[1..].trim_start();
        let value = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => rest[1..].split(q).next().unwrap_or(""),
            _ => rest.split(|c: char| c.is_whitespace()).next().unwrap_or(""),
        };
        return Some(html_escape::decode_html_entities(value).to_string());
    }
    None
}

fn style_property(attrs: &str, property: &str) -> Option<String> {
    let style = attr_value(attrs, "style")?;
    style.split(';').find_map(|decl| {
        let (k, v) = decl.split_once(':')?;
        (k.trim().eq_ignore_ascii_case(property)).then(|| v.trim().to_string())
    })
}

fn block_kind(tag: &str) -> Option<TextKind> {
    match tag {
        "p" => Some(TextKind::Paragraph),
        "h1" => Some(TextKind::HeadingOne),
        "h2" | "h3" | "h4" | "h5" | "h6" => Some(TextKind::HeadingTwo),
        "blockquote" => Some(TextKind::BlockQuote),
        "li" => Some(TextKind::ListItem),
        _ => None,
    }
}

#[derive(Default)]
struct Importer {
    rows: Vec<Row>,
    current: Option<(TextBlock, Option<ListKind>)>,
    lists: Vec<ListKind>,
    marks: Vec<(String, Marks)>,
}

impl Importer {
    fn active_marks(&self) -> Marks {
        self.marks.last().map(|(_, m)| m.clone()).unwrap_or_default()
    }

    fn flush(&mut self) {
        if let Some((mut tb, list)) = self.current.take() {
            if let Some(first) = tb.children.first_mut() {
                first.text = first.text.trim_start().to_string();
            }
            if let Some(last) = tb.children.last_mut() {
                last.text = last.text.trim_end().to_string();
            }
            if tb.children.len() > 1 {
                tb.children.retain(|l| !l.text.is_empty());
            }
            if tb.children.is_empty() {
                tb.children.push(Leaf::default());
            }
            self.rows.push(Row {
                block: RowBlock::Text(tb),
                list,
            });
        }
    }

    fn start_block(&mut self, kind: TextKind, attrs: &str) {
        self.flush();
        let (kind, list) = if kind == TextKind::ListItem {
            (
                TextKind::ListItem,
                Some(self.lists.last().copied().unwrap_or(ListKind::Bulleted)),
            )
        } else {
            (kind, None)
        };
        let mut tb = TextBlock {
            kind,
            align: None,
            children: Vec::new(),
        };
        tb.align = style_property(attrs, "text-align")
            .or_else(|| attr_value(attrs, "align"))
            .and_then(|a| Align::parse(&a));
        self.current = Some((tb, list));
    }

    fn push_text(&mut self, raw: &str) {
        let decoded = html_escape::decode_html_entities(raw);
        let mut text = String::with_capacity(decoded.len());
        let mut last_space = false;
        for c in decoded.chars() {
            if c.is_whitespace() && c != '\u{a0}' {
                if !last_space {
                    text.push(' ');
                }
                last_space = true;
            } else {
                text.push(c);
                last_space = false;
            }
        }
        if self.current.is_none() {
            if text.trim().is_empty() {
                return;
            }
            self.current = Some((
                TextBlock {
                    kind: TextKind::Paragraph,
                    align: None,
                    children: Vec::new(),
                },
                None,
            ));
        }
        let marks = self.active_marks();
        if let Some((tb, _)) = self.current.as_mut() {
            if let Some(prev) = tb.children.last_mut() {
                if prev.marks == marks {
                    if prev.text.ends_with(' ') && text.starts_with(' ') {
                        text.remove(0);
                    }
                    prev.text.push_str(&text);
                    return;
                }
            }
            tb.children.push(Leaf { text, marks });
        }
    }

    fn open(&mut self, name: &str, attrs: &str) {
        if let Some(kind) = block_kind(name) {
            self.start_block(kind, attrs);
            return;
        }
        let mut marks = self.active_marks();
        match name {
            "ul" | "ol" => {
                self.flush();
                self.lists.push(if name == "ol" {
                    ListKind::Numbered
                } else {
                    ListKind::Bulleted
                });
            }
            "img" => {
                self.flush();
                if let Some(src) = attr_value(attrs, "src") {
                    self.rows.push(Row {
                        block: RowBlock::Image(src),
                        list: None,
                    });
                }
            }
            "br" => self.push_text("\n"),
            "strong" | "b" => {
                marks.bold = true;
                self.marks.push((name.to_string(), marks));
            }
            "em" | "i" => {
                marks.italic = true;
                self.marks.push((name.to_string(), marks));
            }
            "u" => {
                marks.underline = true;
                self.marks.push((name.to_string(), marks));
            }
            "code" => {
                marks.code = true;
                self.marks.push((name.to_string(), marks));
            }
            "span" | "font" => {
                if let Some(c) = style_property(attrs, "color").or_else(|| attr_value(attrs, "color")) {
                    marks.color = Some(c);
                }
                if let Some(s) = style_property(attrs, "font-size") {
                    marks.font_size = Some(s);
                }
                if let Some(b) = style_property(attrs, "background-color") {
                    marks.background_color = Some(b);
                }
                self.marks.push((name.to_string(), marks));
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        if block_kind(name).is_some() {
            self.flush();
            return;
        }
        match name {
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            _ => {
                if let Some(pos) = self.marks.iter().rposition(|(n, _)| n == name) {
                    self.marks.truncate(pos);
                }
            }
        }
    }
}

/// Parse card HTML into the editor's document model.
pub fn html_to_document(html: &str) -> Document {
    let mut importer = Importer::default();
    for token in tokenize(html) {
        match token {
            Token::Open { name, attrs } => importer.open(&name, attrs),
            Token::Close(name) => importer.close(&name),
            Token::Text(text) => importer.push_text(text),
        }
    }
    importer.flush();
    Editor {
        rows: importer.rows,
        selection: None,
    }
    .normalized_document()
}

impl Editor {
    fn normalized_document(mut self) -> Document {
        if self.rows.is_empty() {
            self = Editor::default();
        }
        self.normalize();
        self.document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn editor(html: &str) -> Editor {
        Editor::from_html(html)
    }

    #[test]
    fn empty_html_gives_one_paragraph() {
        let doc = html_to_document("");
        assert_eq!(doc.blocks, vec![Block::Text(TextBlock::paragraph(""))]);
    }

    #[test]
    fn parses_blocks_lists_and_marks() {
        let doc = html_to_document(
            "<!DOCTYPE html><html><head><title>x</title><style>p{}</style></head><body>\
             <h1>Title</h1><p>Hello <strong>bold</strong> &amp; <span style=\"color: red\">red</span></p>\
             <ul><li>one</li><li>two</li></ul><img src=\"a.png\"><!-- note --></body></html>",
        );
        assert_eq!(doc.blocks.len(), 4);
        match &doc.blocks[1] {
            Block::Text(tb) => {
                assert_eq!(tb.text(), "Hello bold & red");
                assert!(tb.children[1].marks.bold);
                assert_eq!(tb.children[3].marks.color.as_deref(), Some("red"));
            }
            other => panic!("unexpected block {:?}", other),
        }
        match &doc.blocks[2] {
            Block::List { kind, items } => {
                assert_eq!(*kind, ListKind::Bulleted);
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected block {:?}", other),
        }
        assert_eq!(doc.blocks[3], Block::Image { url: "a.png".into() });
    }

    #[test]
    fn bare_angle_brackets_are_text() {
        let doc = html_to_document("<p>1 < 2 and 3 > 2 is true</p><p>a <3 b</p><p>x <</p>");
        let texts: Vec<String> = doc
            .blocks
            .iter()
            .map(|b| match b {
                Block::Text(tb) => tb.text(),
                other => panic!("unexpected block {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["1 < 2 and 3 > 2 is true", "a <3 b", "x <"]);
        assert_eq!(
            document_to_html(&doc),
            "<p>1 &lt; 2 and 3 &gt; 2 is true</p><p>a &lt;3 b</p><p>x &lt;</p>"
        );
    }

    #[test]
    fn loose_text_becomes_paragraph() {
        let doc = html_to_document("<div>just text</div>");
        assert_eq!(doc.blocks, vec![Block::Text(TextBlock::paragraph("just text"))]);
    }

    #[test]
    fn html_round_trip() {
        let html = "<h1 style=\"text-align:center\">T</h1><p>a <strong>b</strong></p><ol><li>x</li></ol>";
        assert_eq!(editor(html).to_html(), html);
    }

    #[test]
    fn toggle_mark_on_and_off() {
        let mut ed = editor("<p>one</p><p>two</p>");
        ed.select_all();
        assert!(!ed.is_mark_active(MarkFormat::Bold));
        ed.toggle_mark(&Mark::Bold);
        assert!(ed.is_mark_active(MarkFormat::Bold));
        assert_eq!(ed.to_html(), "<p><strong>one</strong></p><p><strong>two</strong></p>");
        ed.toggle_mark(&Mark::Bold);
        assert_eq!(ed.to_html(), "<p>one</p><p>two</p>");
    }

    #[test]
    fn partially_marked_selection_is_not_active() {
        let mut ed = editor("<p><em>one</em></p><p>two</p>");
        ed.select(0, 1);
        assert!(!ed.is_mark_active(MarkFormat::Italic));
        ed.toggle_mark(&Mark::Italic);
        assert_eq!(ed.to_html(), "<p><em>one</em></p><p><em>two</em></p>");
    }

    #[test]
    fn set_mark_overrides_value() {
        let mut ed = editor("<p><span style=\"color:red\">x</span></p>");
        ed.select(0, 0);
        ed.set_mark(&Mark::Color("#00f".into()));
        assert_eq!(ed.to_html(), "<p><span style=\"color:#00f\">x</span></p>");
        assert!(ed.is_mark_active(MarkFormat::Color));
    }

    #[test]
    fn no_selection_is_a_no_op() {
        let mut ed = editor("<p>x</p>");
        ed.toggle_mark(&Mark::Bold);
        ed.toggle_block(BlockFormat::HeadingOne);
        assert_eq!(ed.to_html(), "<p>x</p>");
        assert!(!ed.is_mark_active(MarkFormat::Bold));
    }

    #[test]
    fn toggle_heading() {
        let mut ed = editor("<p>x</p>");
        ed.select(0, 0);
        ed.toggle_block(BlockFormat::HeadingOne);
        assert!(ed.is_block_active(BlockFormat::HeadingOne));
        assert_eq!(ed.to_html(), "<h1>x</h1>");
        ed.toggle_block(BlockFormat::HeadingOne);
        assert_eq!(ed.to_html(), "<p>x</p>");
    }

    #[test]
    fn toggle_list_wraps_and_unwraps() {
        let mut ed = editor("<p>a</p><p>b</p><p>c</p>");
        ed.select(0, 1);
        ed.toggle_block(BlockFormat::BulletedList);
        assert_eq!(ed.to_html(), "<ul><li>a</li><li>b</li></ul><p>c</p>");
        assert!(ed.is_block_active(BlockFormat::BulletedList));

        // switching list type converts the items
        ed.toggle_block(BlockFormat::NumberedList);
        assert_eq!(ed.to_html(), "<ol><li>a</li><li>b</li></ol><p>c</p>");

        // lifting the middle of a list splits it
        let mut ed = editor("<ul><li>a</li><li>b</li><li>c</li></ul>");
        ed.select(1, 1);
        ed.toggle_block(BlockFormat::BulletedList);
        assert_eq!(ed.to_html(), "<ul><li>a</li></ul><p>b</p><ul><li>c</li></ul>");
    }

    #[test]
    fn heading_on_list_item_unwraps_it() {
        let mut ed = editor("<ol><li>a</li></ol>");
        ed.select(0, 0);
        ed.toggle_block(BlockFormat::HeadingTwo);
        assert_eq!(ed.to_html(), "<h2>a</h2>");
    }

    #[test]
    fn insert_image_after_selection() {
        let mut ed = editor("<p>a</p><p>b</p>");
        ed.select(0, 0);
        ed.insert_image("https://example.com/x.png");
        assert_eq!(ed.to_html(), "<p>a</p><img src=\"https://example.com/x.png\" alt=\"\"><p>b</p>");
        assert_eq!(ed.selection(), Some(Selection { anchor: 1, focus: 1 }));
    }

    #[test]
    fn align_applies_to_text_rows() {
        let mut ed = editor("<p>a</p><img src=\"i\"><p>b</p>");
        ed.select_all();
        ed.set_text_align(Align::Right);
        assert_eq!(
            ed.to_html(),
            "<p style=\"text-align:right\">a</p><img src=\"i\" alt=\"\"><p style=\"text-align:right\">b</p>"
        );
    }

    #[test]
    fn selection_is_clamped() {
        let mut ed = editor("<p>a</p><ul><li>b</li><li>c</li></ul>");
        assert_eq!(ed.row_count(), 3);
        ed.select(1, 40);
        assert_eq!(ed.selection(), Some(Selection { anchor: 1, focus: 2 }));
    }

    #[test]
    fn text_is_escaped_on_export() {
        let doc = Document {
            blocks: vec![Block::Text(TextBlock::paragraph("<script>"))],
        };
        assert_eq!(document_to_html(&doc), "<p>&lt;script&gt;</p>");
    }

    #[test]
    fn commands_deserialize_from_toolbar_json() {
        let cmd: Command = serde_json::from_value(json!({"op": "toggleMark", "mark": {"format": "bold"}})).unwrap();
        assert_eq!(cmd, Command::ToggleMark { mark: Mark::Bold });
        let cmd: Command = serde_json::from_value(
            json!({"op": "setMark", "mark": {"format": "fontSize", "value": "20px"}}),
        )
        .unwrap();
        assert_eq!(cmd, Command::SetMark { mark: Mark::FontSize("20px".into()) });
        let cmd: Command =
            serde_json::from_value(json!({"op": "toggleBlock", "format": "block-quote"})).unwrap();
        let mut ed = editor("<p>q</p>");
        ed.select(0, 0);
        ed.apply(&cmd);
        assert_eq!(ed.to_html(), "<blockquote>q</blockquote>");
    }
}
