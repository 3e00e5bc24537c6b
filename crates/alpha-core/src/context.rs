//! The structured context record compiled into the system prompt.
//!
//! One record exists per installation. Every field is a free-form string;
//! fields missing from stored JSON come back as empty strings so old payloads
//! keep loading as categories are added.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamSection {
    pub subjects: String,
    pub dates: String,
    pub preparation_status: String,
    pub notes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrimaryWorkSection {
    /// Used in the section heading only.
    pub employer: String,
    pub current_projects: String,
    pub deadlines: String,
    pub priorities: String,
    pub notes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OtherWorkSection {
    pub projects: String,
    pub deadlines: String,
    pub notes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Venture {
    /// Used in the section heading only.
    pub name: String,
    pub features: String,
    pub deadlines: String,
    pub status: String,
    pub notes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextRecord {
    pub general_memory: String,
    pub exams: ExamSection,
    pub primary_work: PrimaryWorkSection,
    pub other_work: OtherWorkSection,
    pub ventures: Vec<Venture>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One labelled line of a rendered section. `label` is `None` for free text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field<'a> {
    pub label: Option<&'static str>,
    pub value: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section<'a> {
    pub heading: String,
    pub fields: Vec<Field<'a>>,
}

impl Section<'_> {
    /// A section is rendered only when some field carries text.
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.value.trim().is_empty())
    }
}

fn labelled<'a>(label: &'static str, value: &'a str) -> Field<'a> {
    Field {
        label: Some(label),
        value,
    }
}

fn heading_for(name: &str, suffix: &str, fallback: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        fallback.to_string()
    } else {
        format!("{} {suffix}", name.to_uppercase())
    }
}

impl ContextRecord {
    /// Sections in registration order: general memory, exams, primary work,
    /// other work, then each venture in list order.
    pub fn sections(&self) -> Vec<Section<'_>> {
        let mut out = Vec::with_capacity(4 + self.ventures.len());

        out.push(Section {
            heading: "GENERAL MEMORY".to_string(),
            fields: vec![Field {
                label: None,
                value: &self.general_memory,
            }],
        });

        let e = &self.exams;
        out.push(Section {
            heading: "EXAMS".to_string(),
            fields: vec![
                labelled("Subjects", &e.subjects),
                labelled("Exam Dates", &e.dates),
                labelled("Preparation Status", &e.preparation_status),
                labelled("Notes", &e.notes),
            ],
        });

        let w = &self.primary_work;
        out.push(Section {
            heading: heading_for(&w.employer, "WORK", "PRIMARY WORK"),
            fields: vec![
                labelled("Current Projects", &w.current_projects),
                labelled("Deadlines", &w.deadlines),
                labelled("Priorities", &w.priorities),
                labelled("Notes", &w.notes),
            ],
        });

        let o = &self.other_work;
        out.push(Section {
            heading: "OTHER WORK COMMITMENTS".to_string(),
            fields: vec![
                labelled("Projects", &o.projects),
                labelled("Deadlines", &o.deadlines),
                labelled("Notes", &o.notes),
            ],
        });

        for v in &self.ventures {
            out.push(Section {
                heading: heading_for(&v.name, "STARTUP", "VENTURE"),
                fields: vec![
                    labelled("Features/Products", &v.features),
                    labelled("Deadlines", &v.deadlines),
                    labelled("Current Status", &v.status),
                    labelled("Notes", &v.notes),
                ],
            });
        }

        out
    }

    pub fn is_empty(&self) -> bool {
        self.sections().iter().all(Section::is_blank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_deserialize_to_empty() {
        let r: ContextRecord =
            serde_json::from_str(r#"{"generalMemory":"likes tea","exams":{"subjects":"Maths"}}"#)
                .unwrap();
        assert_eq!(r.general_memory, "likes tea");
        assert_eq!(r.exams.subjects, "Maths");
        assert_eq!(r.exams.notes, "");
        assert!(r.ventures.is_empty());
        assert!(r.updated_at.is_none());
    }

    #[test]
    fn serializes_camel_case() {
        let mut r = ContextRecord::default();
        r.exams.preparation_status = "halfway".into();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["exams"]["preparationStatus"], "halfway");
        assert!(json.get("generalMemory").is_some());
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn sections_follow_registration_order() {
        let mut r = ContextRecord::default();
        r.ventures.push(Venture {
            name: "Acme".into(),
            ..Default::default()
        });
        r.ventures.push(Venture::default());
        let headings: Vec<String> = r.sections().into_iter().map(|s| s.heading).collect();
        assert_eq!(
            headings,
            vec![
                "GENERAL MEMORY",
                "EXAMS",
                "PRIMARY WORK",
                "OTHER WORK COMMITMENTS",
                "ACME STARTUP",
                "VENTURE",
            ]
        );
    }

    #[test]
    fn heading_only_fields_do_not_make_a_section_non_blank() {
        let mut r = ContextRecord::default();
        r.primary_work.employer = "Initech".into();
        r.ventures.push(Venture {
            name: "Acme".into(),
            ..Default::default()
        });
        assert!(r.is_empty());

        r.primary_work.deadlines = "Friday".into();
        assert!(!r.is_empty());
        assert_eq!(r.sections()[2].heading, "INITECH WORK");
    }

    #[test]
    fn whitespace_only_counts_as_blank() {
        let mut r = ContextRecord::default();
        r.general_memory = "  \n ".into();
        assert!(r.is_empty());
    }
}
