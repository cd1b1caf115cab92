//! Printers: plain text and markdown (termimad).

use termimad::MadSkin;

use crate::history::TurnResult;

pub struct MarkdownPrinter {
    pub skin: MadSkin,
    pub width: usize,
}

impl Default for MarkdownPrinter {
    fn default() -> Self {
        Self { skin: MadSkin::default(), width: 100 }
    }
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }
}

/// Print an agent reply: prose (optionally markdown-rendered) followed by
/// the computed table/scalar, which is always printed raw so its alignment
/// survives.
pub fn print_reply(response: &str, result: Option<&TurnResult>, markdown: bool) {
    if markdown {
        MarkdownPrinter::default().print(response);
    } else {
        println!("{}", response);
    }
    if let Some(result) = result {
        println!("{}", result.rendered);
    }
}
