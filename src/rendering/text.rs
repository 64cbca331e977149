// Label markup - outlined and rotated text as SVG documents
use std::fmt::Write;

const OUTLINE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    fn as_svg(self) -> &'static str {
        match self {
            Anchor::Start => "start",
            Anchor::Middle => "middle",
            Anchor::End => "end",
        }
    }
}

/// A single line of text positioned by its baseline.
#[derive(Debug, Clone)]
pub struct Label<'a> {
    pub text: &'a str,
    pub x: f32,
    pub baseline: f32,
    pub size: f32,
    pub fill: [u8; 3],
    pub anchor: Anchor,
}

fn svg_open(width: u32, height: u32) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn push_text(svg: &mut String, label: &Label<'_>, dx: i32, dy: i32, fill: [u8; 3], extra: &str) {
    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" font-family="sans-serif" font-size="{}" text-anchor="{}" fill="rgb({},{},{})"{}>{}</text>"#,
        label.x + dx as f32,
        label.baseline + dy as f32,
        label.size,
        label.anchor.as_svg(),
        fill[0],
        fill[1],
        fill[2],
        extra,
        escape(label.text),
    );
}

/// Text with a black outline: copies shifted up to 2px along each axis are
/// drawn first, then the label itself on top.
pub fn outlined(width: u32, height: u32, label: &Label<'_>) -> String {
    let mut svg = svg_open(width, height);
    for offset in -OUTLINE..=OUTLINE {
        push_text(&mut svg, label, offset, 0, [0, 0, 0], "");
        push_text(&mut svg, label, 0, offset, [0, 0, 0], "");
    }
    push_text(&mut svg, label, 0, 0, label.fill, "");
    svg.push_str("</svg>");
    svg
}

/// Text turned 90 degrees so it reads bottom to top, pivoting on its anchor.
pub fn rotated(width: u32, height: u32, label: &Label<'_>) -> String {
    let mut svg = svg_open(width, height);
    let transform = format!(
        r#" transform="rotate(-90 {} {})""#,
        label.x, label.baseline
    );
    push_text(&mut svg, label, 0, 0, label.fill, &transform);
    svg.push_str("</svg>");
    svg
}
