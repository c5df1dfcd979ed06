pub use uplc::term::Site;

/// An immutable source buffer with a name for diagnostics.
#[derive(Clone, Debug)]
pub struct Source {
    pub name: String,
    pub text: String,
}

impl Source {
    pub fn new<N: Into<String>, T: Into<String>>(name: N, text: T) -> Self {
        Source {
            name: name.into(),
            text: text.into(),
        }
    }

    /// 1-based line and column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let upto = &self.text.as_bytes()[..offset.min(self.text.len())];
        let line = upto.iter().filter(|&&b| b == b'\n').count() + 1;
        let col = upto
            .iter()
            .rev()
            .take_while(|&&b| b != b'\n')
            .count()
            + 1;
        (line, col)
    }

    pub fn describe(&self, site: Site) -> String {
        let (line, col) = self.line_col(site.start as usize);
        format!("{}:{}:{}", self.name, line, col)
    }

    pub fn snippet(&self, site: Site) -> &str {
        let start = (site.start as usize).min(self.text.len());
        let end = (site.end as usize).min(self.text.len()).max(start);
        &self.text[start..end]
    }
}

/// Ordered (bytecode preorder offset, original site) pairs; the link from
/// emitted terms back to the user's source.
pub type CodeMap = Vec<(u32, Site)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_from_one() {
        let s = Source::new("t", "ab\ncd\n");
        assert_eq!(s.line_col(0), (1, 1));
        assert_eq!(s.line_col(1), (1, 2));
        assert_eq!(s.line_col(3), (2, 1));
        assert_eq!(s.line_col(4), (2, 2));
    }

    #[test]
    fn describe_renders_name_line_col() {
        let s = Source::new("main.hl", "x\ny z");
        assert_eq!(s.describe(Site::new(4, 5)), "main.hl:2:3");
    }
}
