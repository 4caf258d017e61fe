use serde::{Deserialize, Serialize};

/// Separator placed between the cells of one row
pub const CELL_SEPARATOR: &str = " | ";

/// A table lifted out of a document, with every cell as plain text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub caption: Option<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(caption: Option<String>, rows: Vec<Vec<String>>) -> Self {
        Self { caption, rows }
    }

    /// Returns true if no row has a non-empty cell
    pub fn is_empty(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.iter().all(|cell| cell.is_empty()))
    }

    /// Pads every row with empty cells up to the widest row
    pub fn pad_rows(&mut self) {
        let width = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }

    /// Renders the rows, one line per row, cells joined by `" | "`
    ///
    /// A literal `|` inside a cell is escaped as `\|` so the separator stays unambiguous.
    pub fn render_rows(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.replace('|', "\\|"))
                    .collect::<Vec<_>>()
                    .join(CELL_SEPARATOR)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Renders the table as a delimited `[TABLE]` block for body text
    pub fn render_block(&self) -> String {
        let mut out = String::from("[TABLE]\n");
        if let Some(caption) = &self.caption {
            out.push_str(caption);
            out.push('\n');
        }
        out.push_str(&self.render_rows());
        out.push_str("\n[/TABLE]");
        out
    }

    /// Renders the table as a named `[SHEET]` block
    pub fn render_sheet(&self, name: &str) -> String {
        format!("[SHEET {}]\n{}\n[/SHEET]", name, self.render_rows())
    }
}
