//! Document compiler - merges the three fragments into one renderable page.
//!
//! The output is self-contained: the stylesheet is inlined in the head, the
//! markup opens the body and the script runs last, inside a boundary that
//! keeps its declarations out of the global scope and turns any uncaught
//! fault into an on-page banner instead of aborting the document.
//!
//! Compilation is total. Malformed markup or script is legal input; it only
//! fails when the preview renders it.

use crate::source::SourceSet;
use std::fmt;

const DOCUMENT_HEAD: &str = "<!DOCTYPE html>
<html>
<head>
  <meta charset=\"utf-8\">
  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">
  <style>";

const STYLE_TO_BODY: &str = "</style>
</head>
<body>";

const SCRIPT_OPEN: &str = "
<script>
(function() {
  try {
";

// Banner styling is fixed so the failure is readable over any user layout.
const SCRIPT_CLOSE: &str = "
  } catch (error) {
    console.error('Runtime error:', error);

    var banner = document.createElement('div');
    banner.style.color = 'red';
    banner.style.padding = '10px';
    banner.style.fontFamily = 'monospace';
    banner.style.whiteSpace = 'pre-wrap';
    banner.style.position = 'fixed';
    banner.style.bottom = '0';
    banner.style.left = '0';
    banner.style.right = '0';
    banner.style.background = 'rgba(255, 220, 220, 0.9)';
    banner.style.borderTop = '2px solid red';
    banner.style.zIndex = '1000';
    banner.setAttribute('data-playground-error', '');
    var message = error && error.message !== undefined ? error.message : String(error);
    banner.textContent = 'JavaScript Error: ' + message;

    document.body.appendChild(banner);
  }
})();
</script>
</body>
</html>
";

/// A complete, self-contained document. Immutable once produced; the next
/// compile supersedes it rather than mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompiledDocument(String);

impl CompiledDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CompiledDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CompiledDocument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compile a source set into a document.
///
/// Every fragment is inlined verbatim: the style block content is exactly
/// `sources.style`, the body starts with exactly `sources.markup`, and the
/// script block holds exactly `sources.script` between the boundary's
/// opening and closing lines.
pub fn compile(sources: &SourceSet) -> CompiledDocument {
    let capacity = DOCUMENT_HEAD.len()
        + STYLE_TO_BODY.len()
        + SCRIPT_OPEN.len()
        + SCRIPT_CLOSE.len()
        + sources.style.len()
        + sources.markup.len()
        + sources.script.len();

    let mut out = String::with_capacity(capacity);
    out.push_str(DOCUMENT_HEAD);
    out.push_str(&sources.style);
    out.push_str(STYLE_TO_BODY);
    out.push_str(&sources.markup);
    out.push_str(SCRIPT_OPEN);
    out.push_str(&sources.script);
    out.push_str(SCRIPT_CLOSE);

    CompiledDocument(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn between<'a>(doc: &'a str, open: &str, close: &str) -> &'a str {
        let start = doc.find(open).unwrap() + open.len();
        let end = start + doc[start..].find(close).unwrap();
        &doc[start..end]
    }

    #[test]
    fn test_compile_is_deterministic() {
        let sources = SourceSet::defaults();
        assert_eq!(compile(&sources), compile(&sources));
        assert_eq!(compile(&sources).as_str(), compile(&sources.clone()).as_str());
    }

    #[test]
    fn test_style_block_is_verbatim() {
        let css = "p { color: red }\n/* note */ .x>.y{margin:0}";
        let doc = compile(&SourceSet::new("", css, ""));
        assert_eq!(between(doc.as_str(), "<style>", "</style>"), css);
    }

    #[test]
    fn test_body_starts_with_markup() {
        let html = "<p>hi</p>\n<ul><li>one</ul>";
        let doc = compile(&SourceSet::new(html, "", ""));
        let body = &doc.as_str()[doc.as_str().find("<body>").unwrap() + "<body>".len()..];
        assert!(body.starts_with(html));
    }

    #[test]
    fn test_script_is_wrapped_verbatim() {
        let js = "const x = 1;\n// trailing comment";
        let doc = compile(&SourceSet::new("", "", js));
        let wrapped = between(doc.as_str(), "  try {\n", "\n  } catch (error) {");
        assert_eq!(wrapped, js);
        assert!(doc.as_str().contains("(function() {"));
        assert!(doc.as_str().contains("document.body.appendChild(banner)"));
    }

    #[test]
    fn test_script_follows_markup() {
        let doc = compile(&SourceSet::new("<div id=\"app\"></div>", "", "app;"));
        let markup_at = doc.as_str().find("<div id=\"app\">").unwrap();
        let script_at = doc.as_str().find("<script>").unwrap();
        assert!(markup_at < script_at);
    }

    #[test]
    fn test_empty_fragments_compile() {
        let doc = compile(&SourceSet::default());
        let text = doc.as_str();

        assert!(text.starts_with("<!DOCTYPE html>"));
        assert!(text.contains("<meta charset=\"utf-8\">"));
        assert!(text.contains("name=\"viewport\""));
        assert_eq!(between(text, "<style>", "</style>"), "");
        assert!(text.trim_end().ends_with("</html>"));
    }
}
