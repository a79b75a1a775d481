//! Object key templates.
//!
//! Templates are handlebars with the fields `Name`, `Version`, `StemcellOS`
//! and `StemcellVersion`, plus a `trimSuffix` helper:
//!
//! ```text
//! {{trimSuffix Name "-release"}}/{{Name}}-{{Version}}-{{StemcellOS}}-{{StemcellVersion}}.tgz
//! ```
//!
//! Go-template style field references (`{{.Name}}`) are accepted too.
//! Rendering is strict: an unknown field is an error, never an empty string.

use handlebars::{Handlebars, RenderError, TemplateError, handlebars_helper, no_escape};
use kiln_release::Requirement;
use serde::Serialize;

const TEMPLATE_NAME: &str = "path";

handlebars_helper!(trim_suffix: |value: str, suffix: str| {
    value.strip_suffix(suffix).unwrap_or(value).to_string()
});

/// Values a template can reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateFields {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "StemcellOS")]
    pub stemcell_os: String,
    #[serde(rename = "StemcellVersion")]
    pub stemcell_version: String,
}

impl From<&Requirement> for TemplateFields {
    fn from(requirement: &Requirement) -> Self {
        Self {
            name: requirement.name.clone(),
            version: requirement.version.clone(),
            stemcell_os: requirement.stemcell_os.clone(),
            stemcell_version: requirement.stemcell_version.clone(),
        }
    }
}

pub struct PathTemplate {
    source: String,
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PathTemplate").field(&self.source).finish()
    }
}

impl PathTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(no_escape);
        registry.register_helper("trimSuffix", Box::new(trim_suffix));
        registry.register_template_string(TEMPLATE_NAME, normalize_go_fields(source))?;
        Ok(Self {
            source: source.to_string(),
            registry,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn render(&self, fields: &TemplateFields) -> Result<String, RenderError> {
        self.registry.render(TEMPLATE_NAME, fields)
    }
}

/// `{{.Name}}` -> `{{Name}}`, `{{trimSuffix .Name "x"}}` -> `{{trimSuffix Name "x"}}`.
/// Text outside `{{ }}` is left alone.
fn normalize_go_fields(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let block = &rest[start..start + len + 2];
        let mut previous = ' ';
        let mut chars = block.chars().peekable();
        while let Some(c) = chars.next() {
            let starts_field = c == '.'
                && matches!(previous, '{' | '(' | '~' | ' ' | '\t')
                && chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_');
            if !starts_field {
                out.push(c);
            }
            previous = c;
        }
        rest = &rest[start + len + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields() -> TemplateFields {
        TemplateFields {
            name: "bpm-release".to_string(),
            version: "1.2.3".to_string(),
            stemcell_os: "ubuntu-xenial".to_string(),
            stemcell_version: "621.55".to_string(),
        }
    }

    #[test]
    fn renders_fields_and_helpers() {
        let template = PathTemplate::parse(
            "2.11/{{trimSuffix Name \"-release\"}}/{{Name}}-{{Version}}-{{StemcellOS}}-{{StemcellVersion}}.tgz",
        )
        .expect("parse");
        assert_eq!(
            template.render(&fields()).expect("render"),
            "2.11/bpm/bpm-release-1.2.3-ubuntu-xenial-621.55.tgz"
        );
    }

    #[test]
    fn accepts_go_style_references() {
        let template =
            PathTemplate::parse("{{trimSuffix .Name \"-release\"}}/{{.Name}}-{{ .Version }}.tgz")
                .expect("parse");
        assert_eq!(
            template.render(&fields()).expect("render"),
            "bpm/bpm-release-1.2.3.tgz"
        );
    }

    #[test]
    fn normalization_leaves_literal_dots() {
        assert_eq!(
            normalize_go_fields("2.11/{{.Name}}.tgz"),
            "2.11/{{Name}}.tgz"
        );
    }

    #[test]
    fn unknown_field_is_an_error() {
        let template = PathTemplate::parse("{{.Nmae}}.tgz").expect("parse");
        assert!(template.render(&fields()).is_err());
    }

    #[test]
    fn unbalanced_template_fails_to_parse() {
        assert!(PathTemplate::parse("{{#if Name}}").is_err());
    }
}
