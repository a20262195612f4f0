//! Language table: identifiers, labels, file extensions and starter templates.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages the editor knows about. Only some of them can be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    C,
    Cpp,
    Html,
    Css,
    Json,
    Markdown,
}

/// Placeholder content for a fresh document in a language without a template.
pub const BLANK_TEMPLATE: &str = "// New file\n// Start coding here...\n\n";

impl Language {
    pub const ALL: [Language; 9] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Python,
        Language::C,
        Language::Cpp,
        Language::Html,
        Language::Css,
        Language::Json,
        Language::Markdown,
    ];

    /// Stable identifier used in config files and on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Html => "html",
            Self::Css => "css",
            Self::Json => "json",
            Self::Markdown => "markdown",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::Python => "Python",
            Self::C => "C",
            Self::Cpp => "C++",
            Self::Html => "HTML",
            Self::Css => "CSS",
            Self::Json => "JSON",
            Self::Markdown => "Markdown",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::JavaScript => ".js",
            Self::TypeScript => ".ts",
            Self::Python => ".py",
            Self::C => ".c",
            Self::Cpp => ".cpp",
            Self::Html => ".html",
            Self::Css => ".css",
            Self::Json => ".json",
            Self::Markdown => ".md",
        }
    }

    /// Parse a language identifier (case-insensitive). Accepts a few common aliases.
    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        match id.as_str() {
            "js" => return Some(Self::JavaScript),
            "ts" => return Some(Self::TypeScript),
            "py" => return Some(Self::Python),
            "c++" | "cxx" => return Some(Self::Cpp),
            "md" => return Some(Self::Markdown),
            _ => {}
        }
        Self::ALL.into_iter().find(|lang| lang.id() == id)
    }

    /// Detect the language from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        let dotted = format!(".{ext}");
        Self::ALL.into_iter().find(|lang| lang.extension() == dotted)
    }

    /// Starter program shown when a document is created in this language.
    pub fn template(self) -> &'static str {
        match self {
            Self::C => C_TEMPLATE,
            Self::Cpp => CPP_TEMPLATE,
            Self::Python => PYTHON_TEMPLATE,
            Self::JavaScript => JAVASCRIPT_TEMPLATE,
            _ => BLANK_TEMPLATE,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|l| l.id()).collect();
            anyhow::anyhow!("Unknown language '{s}'. Supported values: {}", known.join(", "))
        })
    }
}

const C_TEMPLATE: &str = r#"#include <stdio.h>

int main() {
    printf("Hello, World from C!\n");

    // Variables and basic operations
    int num1 = 10;
    int num2 = 20;
    int sum = num1 + num2;

    printf("Sum of %d and %d is: %d\n", num1, num2, sum);

    return 0;
}"#;

const CPP_TEMPLATE: &str = r#"#include <iostream>
#include <string>

using namespace std;

int main() {
    cout << "Hello, World from C++!" << endl;

    // Variables and basic operations
    string name = "CodeBuddy";
    int version = 1;

    cout << "Welcome to " << name << " v" << version << endl;

    // Basic input/output example
    int num1 = 15;
    int num2 = 25;
    cout << "Sum: " << (num1 + num2) << endl;

    return 0;
}"#;

const PYTHON_TEMPLATE: &str = r#"# Python example
print("Hello, World from Python!")

# Variables and basic operations
name = "CodeBuddy"
version = 1.0

print(f"Welcome to {name} v{version}")

# Basic calculations
num1 = 10
num2 = 20
result = num1 + num2
print(f"Sum of {num1} and {num2} is: {result}")"#;

const JAVASCRIPT_TEMPLATE: &str = r#"// JavaScript example
console.log("Hello, World from JavaScript!");

// Variables and basic operations
const name = "CodeBuddy";
const version = "1.0";

console.log(`Welcome to ${name} v${version}`);

// Basic calculations
const num1 = 10;
const num2 = 20;
const result = num1 + num2;
console.log(`Sum of ${num1} and ${num2} is: ${result}`);"#;
