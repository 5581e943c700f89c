//! Turns a captured error's raw stack frames into a structured,
//! source-mapped trace.

use super::SourceMapRegistry;
use std::path::Path;

/// One raw or resolved stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: Option<String>,
    pub function: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub is_native: bool,
    /// The `sourceRoot`-style prefix this frame's `file` was generated
    /// under, if known (used for xJet-internal frame detection and for
    /// distribution-relative rewriting).
    pub source_root: Option<String>,
}

impl Frame {
    fn is_complete(&self) -> bool {
        self.file.is_some() && self.function.is_some() && self.line.is_some() && self.column.is_some()
    }

    fn is_framework(&self) -> bool {
        let in_source = self.file.as_deref().map(|f| f.contains("xjet") && !f.contains("xjet.config")).unwrap_or(false);
        let in_root = self.source_root.as_deref().map(|r| r.contains("xJet")).unwrap_or(false);
        in_source || in_root
    }
}

/// The formatter's output: a structured trace plus the first resolvable
/// frame's code snippet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedTrace {
    pub code: Option<String>,
    pub formatted_code: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub source: Option<String>,
    pub stacks: Vec<Frame>,
}

pub struct StackFormatter {
    registry: SourceMapRegistry,
    with_native_frames: bool,
    with_framework_frames: bool,
    /// Root of compiled output, used to rewrite `source_root`-relative
    /// sources to distribution-relative ones.
    dist_dir: String,
}

impl StackFormatter {
    pub fn new(registry: SourceMapRegistry, with_native_frames: bool, with_framework_frames: bool) -> Self {
        Self { registry, with_native_frames, with_framework_frames, dist_dir: "dist".into() }
    }

    /// Filter + resolve `frames`, re-running with framework frames
    /// force-enabled if filtering would otherwise drop everything.
    pub fn format(&self, frames: &[Frame], lines_before: usize, lines_after: usize, source_text: impl Fn(&str) -> Option<String>) -> FormattedTrace {
        let filtered = self.filter(frames, self.with_framework_frames);
        let filtered = if filtered.is_empty() && !frames.is_empty() {
            self.filter(frames, true)
        } else {
            filtered
        };
        self.resolve(filtered, lines_before, lines_after, source_text)
    }

    fn filter(&self, frames: &[Frame], allow_framework: bool) -> Vec<Frame> {
        frames
            .iter()
            .filter(|f| f.is_complete())
            .filter(|f| self.with_native_frames || !f.is_native)
            .filter(|f| allow_framework || !f.is_framework())
            .cloned()
            .collect()
    }

    fn resolve(
        &self,
        frames: Vec<Frame>,
        lines_before: usize,
        lines_after: usize,
        source_text: impl Fn(&str) -> Option<String>,
    ) -> FormattedTrace {
        let mut out = FormattedTrace { stacks: Vec::with_capacity(frames.len()), ..Default::default() };
        let mut captured = false;

        for mut frame in frames {
            if let (Some(file), Some(line), Some(col)) = (frame.file.clone(), frame.line, frame.column) {
                if let Some(map) = self.registry.lookup(Path::new(&file)) {
                    if let Some(token) = map.lookup_token(line.saturating_sub(1), col.saturating_sub(1)) {
                        frame.file = token.get_source().map(|s| self.normalize_path(s, line));
                        frame.line = Some(token.get_src_line() + 1);
                        frame.column = Some(token.get_src_col() + 1);
                    }
                }
            } else if let Some(file) = &frame.file {
                frame.file = Some(self.normalize_path(file, frame.line.unwrap_or(0)));
            }

            if !captured {
                if let (Some(file), Some(line)) = (frame.file.clone(), frame.line) {
                    if let Some(text) = source_text(&file) {
                        out.code = Some(text.clone());
                        out.formatted_code = Some(self.snippet(&text, line, lines_before, lines_after));
                        out.line = Some(line);
                        out.column = frame.column;
                        out.source = Some(file);
                        captured = true;
                    }
                }
            }

            out.stacks.push(frame);
        }

        out
    }

    fn normalize_path(&self, source: &str, line: u32) -> String {
        if source.starts_with("http://") || source.starts_with("https://") {
            return format!("{source}#L{line}");
        }
        if let Some(stripped) = source.strip_prefix("file://") {
            return stripped.to_string();
        }
        if let Some(stripped) = source.strip_prefix("xJet/") {
            return format!("{}/{stripped}", self.dist_dir);
        }
        source.to_string()
    }

    fn snippet(&self, text: &str, line: u32, before: usize, after: usize) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let idx = line.saturating_sub(1) as usize;
        let start = idx.saturating_sub(before);
        let end = (idx + after + 1).min(lines.len());
        lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, l)| format!("{:>5} | {}", start + i + 1, l))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_frame(file: &str, native: bool) -> Frame {
        Frame {
            file: Some(file.into()),
            function: Some("fn".into()),
            line: Some(3),
            column: Some(1),
            is_native: native,
            source_root: None,
        }
    }

    #[test]
    fn drops_incomplete_frames() {
        let formatter = StackFormatter::new(SourceMapRegistry::new(), false, false);
        let frames = vec![Frame { file: None, function: None, line: None, column: None, is_native: false, source_root: None }];
        let trace = formatter.format(&frames, 2, 3, |_| None);
        assert!(trace.stacks.is_empty());
    }

    #[test]
    fn drops_native_unless_enabled() {
        let formatter = StackFormatter::new(SourceMapRegistry::new(), false, false);
        let frames = vec![complete_frame("a.ts", true), complete_frame("b.ts", false)];
        let trace = formatter.format(&frames, 0, 0, |_| None);
        assert_eq!(trace.stacks.len(), 1);
        assert_eq!(trace.stacks[0].file.as_deref(), Some("b.ts"));
    }

    #[test]
    fn falls_back_to_framework_frames_when_empty() {
        let formatter = StackFormatter::new(SourceMapRegistry::new(), false, false);
        let frame = Frame { source_root: Some("xJet/dist".into()), ..complete_frame("xjet/runtime.ts", false) };
        let trace = formatter.format(&[frame], 0, 0, |_| None);
        assert_eq!(trace.stacks.len(), 1, "fallback pass must re-enable framework frames");
    }

    #[test]
    fn captures_snippet_for_first_resolvable_frame() {
        let formatter = StackFormatter::new(SourceMapRegistry::new(), false, false);
        let frames = vec![complete_frame("a.ts", false)];
        let text = "one\ntwo\nthree\nfour\nfive".to_string();
        let trace = formatter.format(&frames, 1, 1, move |f| (f == "a.ts").then(|| text.clone()));
        assert_eq!(trace.line, Some(3));
        assert!(trace.formatted_code.unwrap().contains("three"));
    }
}
