//! The three editable fragments and the built-in samples.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three independently edited fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fragment {
    Markup,
    Style,
    Script,
}

impl Fragment {
    pub const ALL: [Fragment; 3] = [Fragment::Markup, Fragment::Style, Fragment::Script];

    /// Tab label shown by the editing surface
    pub fn label(self) -> &'static str {
        match self {
            Fragment::Markup => "HTML",
            Fragment::Style => "CSS",
            Fragment::Script => "JavaScript",
        }
    }

    /// Language id handed to the text-editing widget
    pub fn language(self) -> &'static str {
        match self {
            Fragment::Markup => "html",
            Fragment::Style => "css",
            Fragment::Script => "javascript",
        }
    }

    /// File name used when the fragment is exported on its own
    pub fn file_name(self) -> &'static str {
        match self {
            Fragment::Markup => "index.html",
            Fragment::Style => "styles.css",
            Fragment::Script => "script.js",
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The markup/style/script triple. No schema is enforced on any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSet {
    pub markup: String,
    pub style: String,
    pub script: String,
}

impl SourceSet {
    pub fn new(
        markup: impl Into<String>,
        style: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            markup: markup.into(),
            style: style.into(),
            script: script.into(),
        }
    }

    /// The starter samples loaded on startup and restored by Clear.
    pub fn defaults() -> Self {
        Self::new(DEFAULT_HTML, DEFAULT_CSS, DEFAULT_JS)
    }

    pub fn get(&self, fragment: Fragment) -> &str {
        match fragment {
            Fragment::Markup => &self.markup,
            Fragment::Style => &self.style,
            Fragment::Script => &self.script,
        }
    }

    /// Replace one fragment wholesale.
    pub fn set(&mut self, fragment: Fragment, text: impl Into<String>) {
        let slot = match fragment {
            Fragment::Markup => &mut self.markup,
            Fragment::Style => &mut self.style,
            Fragment::Script => &mut self.script,
        };
        *slot = text.into();
    }
}

pub const DEFAULT_HTML: &str = r#"<div class="container">
  <h1>Hello World</h1>
  <p>Start coding to see the magic happen!</p>
  <button id="clickMe">Click me</button>
</div>"#;

pub const DEFAULT_CSS: &str = r#"body {
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen,
    Ubuntu, Cantarell, 'Open Sans', 'Helvetica Neue', sans-serif;
  margin: 0;
  padding: 20px;
  color: #333;
  transition: all 0.3s ease;
}

.container {
  max-width: 600px;
  margin: 0 auto;
  padding: 20px;
  border-radius: 8px;
  box-shadow: 0 4px 20px rgba(0, 0, 0, 0.1);
  background: white;
}

h1 {
  color: #2563eb;
  margin-top: 0;
}

button {
  background-color: #2563eb;
  color: white;
  border: none;
  padding: 8px 16px;
  border-radius: 4px;
  cursor: pointer;
  font-size: 14px;
  transition: all 0.2s ease;
}

button:hover {
  background-color: #1d4ed8;
  transform: translateY(-2px);
}"#;

pub const DEFAULT_JS: &str = r#"// Get the button element
const button = document.getElementById('clickMe');

// Add an event listener to the button
button.addEventListener('click', function() {
  // Create a new element
  const newElement = document.createElement('p');
  newElement.textContent = 'You clicked the button!';
  newElement.style.color = '#2563eb';

  // Add it to the container
  document.querySelector('.container').appendChild(newElement);

  // Add a little animation
  newElement.style.opacity = '0';
  setTimeout(() => {
    newElement.style.transition = 'opacity 0.5s ease';
    newElement.style.opacity = '1';
  }, 10);
});

console.log('JavaScript loaded successfully!');"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_one_fragment() {
        let mut sources = SourceSet::defaults();
        sources.set(Fragment::Style, "p{color:red}");

        assert_eq!(sources.get(Fragment::Style), "p{color:red}");
        assert_eq!(sources.get(Fragment::Markup), DEFAULT_HTML);
        assert_eq!(sources.get(Fragment::Script), DEFAULT_JS);
    }

    #[test]
    fn test_export_file_names() {
        let names: Vec<_> = Fragment::ALL.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, ["index.html", "styles.css", "script.js"]);
    }
}
