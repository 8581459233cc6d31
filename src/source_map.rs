//! Slices the raw rules text into lines and remembers where each top-level
//! document item begins, so diagnostics can quote the original YAML of the
//! item they are about.

/// Line table over the raw rules text.
///
/// `lines` holds the non-empty lines in order, trailing newlines stripped.
/// `indices` holds the 1-based line index at which each top-level item
/// begins (a line whose first character is `-`, excluding `---` document
/// separators), terminated by a sentinel one past the last line.
#[derive(Debug, Clone)]
pub struct SourceMap {
    lines: Vec<String>,
    indices: Vec<usize>,
}

impl SourceMap {
    #[must_use]
    pub fn new(content: &str) -> Self {
        let lines: Vec<String> = content
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();

        let mut indices: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with('-') && !l.starts_with("---"))
            .map(|(i, _)| i + 1)
            .collect();
        indices.push(lines.len() + 1);

        Self { lines, indices }
    }

    /// Number of top-level items seen (the sentinel is not counted).
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.indices.len() - 1
    }

    /// The original YAML slice of the `n`-th (0-based) top-level item, with
    /// a trailing blank line appended. `None` when `n` is out of range.
    #[must_use]
    pub fn item_context(&self, n: usize) -> Option<String> {
        let row = *self.indices.get(n)?;
        if n + 1 == self.indices.len() {
            return None; // sentinel
        }
        Some(self.slice_from(row))
    }

    /// The item slice containing the given 1-based row, for rendering YAML
    /// parser errors at the position they report.
    #[must_use]
    pub fn context_at_row(&self, row: usize) -> Option<String> {
        let start = self
            .indices
            .iter()
            .take(self.indices.len() - 1)
            .copied()
            .filter(|&i| i <= row)
            .next_back()?;
        Some(self.slice_from(start))
    }

    fn slice_from(&self, row: usize) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate().skip(row - 1) {
            if i + 1 > row && line.starts_with('-') {
                break;
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}
