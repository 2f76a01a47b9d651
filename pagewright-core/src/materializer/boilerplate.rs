//! Files injected into every new repository

use chrono::{DateTime, Datelike, Utc};

use crate::task::{FileSet, GeneratedFile};

pub const LICENSE_PATH: &str = "LICENSE";
pub const README_PATH: &str = "README.md";

/// MIT license text for `holder`
pub fn license(holder: &str, year: i32) -> String {
    format!(
        r#"MIT License

Copyright (c) {year} {holder}

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
"#
    )
}

/// README describing a generated site
pub fn readme(repo_name: &str, repository_url: &str, files: &FileSet) -> String {
    let mut body = String::new();

    body.push_str(&format!("# {}\n\n", repo_name));
    body.push_str("This repository contains a minimal static web app generated automatically.\n\n");

    body.push_str("## Setup\n\n");
    body.push_str("```bash\n");
    body.push_str(&format!("git clone {}\n", repository_url));
    body.push_str(&format!("cd {}\n", repo_name));
    body.push_str("```\n\n");

    body.push_str("## Usage\n\n");
    body.push_str("Open `index.html` in a browser, or visit the published site.\n\n");

    let paths: Vec<&str> = files
        .paths()
        .into_iter()
        .filter(|p| *p != README_PATH && *p != LICENSE_PATH)
        .collect();
    if !paths.is_empty() {
        body.push_str("## Files\n\n");
        for path in paths {
            body.push_str(&format!("- `{}`\n", path));
        }
        body.push('\n');
    }

    body.push_str("## License\n\nMIT\n");
    body
}

/// Revision note appended to the README on later rounds
pub fn revision_note(round: u32, at: DateTime<Utc>) -> String {
    format!(
        "\n\n### Round {} ({})\n\nUpdated according to new brief.\n",
        round,
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// `files` followed by the injected LICENSE and README
///
/// The injected files come last so they win over generated ones.
pub fn with_boilerplate(
    files: &FileSet,
    repo_name: &str,
    repository_url: &str,
    license_holder: &str,
    now: DateTime<Utc>,
) -> FileSet {
    let mut out = files.clone();
    out.push(GeneratedFile::new(LICENSE_PATH, license(license_holder, now.year())));
    out.push(GeneratedFile::new(README_PATH, readme(repo_name, repository_url, files)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_license_mentions_holder_and_year() {
        let text = license("Ada", 2026);
        assert!(text.starts_with("MIT License"));
        assert!(text.contains("Copyright (c) 2026 Ada"));
    }

    #[test]
    fn test_readme_lists_generated_files_only() {
        let files = FileSet::new(vec![
            GeneratedFile::new("index.html", "<h1>Hi</h1>"),
            GeneratedFile::new("README.md", "from the model"),
        ]);
        let text = readme("T1-1", "https://github.com/o/T1-1", &files);
        assert!(text.starts_with("# T1-1"));
        assert!(text.contains("git clone https://github.com/o/T1-1"));
        assert!(text.contains("- `index.html`"));
        assert!(!text.contains("- `README.md`"));
    }

    #[test]
    fn test_injected_files_win() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let files = FileSet::new(vec![GeneratedFile::new("LICENSE", "custom")]);
        let out = with_boilerplate(&files, "r", "u", "Ada", now);

        assert_eq!(out.len(), 3);
        let last_license = out
            .files()
            .iter()
            .rev()
            .find(|f| f.path == LICENSE_PATH)
            .unwrap();
        assert!(String::from_utf8_lossy(&last_license.content).contains("2026 Ada"));
    }

    #[test]
    fn test_revision_note_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        assert_eq!(
            revision_note(2, at),
            "\n\n### Round 2 (2026-10-16 12:00:00 UTC)\n\nUpdated according to new brief.\n"
        );
    }
}
