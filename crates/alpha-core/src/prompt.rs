//! Context record to system prompt compilation.
//!
//! Output is a pure function of the record, the profile and the timestamp.
//! The timestamp lives on the line right after [`TIMESTAMP_MARKER`] so that
//! [`restamp`] can refresh it without touching a prompt the user edited.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::context::{ContextRecord, Section};

pub const TIMESTAMP_MARKER: &str = "**CURRENT DATE & TIME:**";
const TIMESTAMP_FORMAT: &str = "%A, %B %-d, %Y at %I:%M %p";
const SEPARATOR: &str = "---";

/// Names woven into the generated prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptProfile {
    pub assistant_name: String,
    pub user_name: String,
}

impl Default for PromptProfile {
    fn default() -> Self {
        Self {
            assistant_name: "Alpha".to_string(),
            user_name: "the user".to_string(),
        }
    }
}

/// `Saturday, October 18, 2026 at 03:45 PM`
pub fn format_timestamp(now: &NaiveDateTime) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Clone, Debug, Default)]
pub struct PromptCompiler {
    profile: PromptProfile,
}

impl PromptCompiler {
    pub fn new(profile: PromptProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &PromptProfile {
        &self.profile
    }

    pub fn compile(&self, record: &ContextRecord, now: &NaiveDateTime) -> String {
        let assistant = &self.profile.assistant_name;
        let user = &self.profile.user_name;
        let mut out = String::with_capacity(2048);

        out.push_str(&format!(
            "You are {assistant}, the personal assistant of {user}. Your purpose is to help \
             {user} plan, organize, and tackle everything in their life with the context \
             provided below.\n\n"
        ));
        out.push_str(TIMESTAMP_MARKER);
        out.push('\n');
        out.push_str(&format_timestamp(now));
        out.push_str("\n\n");
        out.push_str(
            "**IMPORTANT:** Always consider the current date and time when:\n\
             - Planning schedules and timelines\n\
             - Calculating days/weeks until deadlines\n\
             - Suggesting what to do today/this week\n\
             - Estimating preparation time needed\n\
             - Prioritizing urgent vs non-urgent tasks\n\n",
        );
        out.push_str(&format!(
            "**Your Role:**\n\
             - Guide and plan everything ahead for {user}\n\
             - Provide strategic advice considering all commitments\n\
             - Help prioritize tasks based on urgency and importance\n\
             - Be proactive, supportive, and motivating\n\
             - Always consider the full context AND current date/time when providing \
             recommendations\n\n{SEPARATOR}\n\n"
        ));

        for section in record.sections() {
            if !section.is_blank() {
                render_section(&mut out, &section);
            }
        }

        out.push_str(&format!(
            "Based on all the above context, provide strategic advice, actionable plans, and \
             help {user} manage their time effectively. Always consider their energy levels, \
             deadlines, and long-term goals."
        ));
        out
    }
}

fn render_section(out: &mut String, section: &Section<'_>) {
    out.push_str("**");
    out.push_str(&section.heading);
    out.push_str(":**\n");
    for field in &section.fields {
        if field.value.trim().is_empty() {
            continue;
        }
        if let Some(label) = field.label {
            out.push_str(label);
            out.push_str(": ");
        }
        out.push_str(field.value);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(SEPARATOR);
    out.push_str("\n\n");
}

/// Replace the timestamp line after the marker, leaving every other byte
/// untouched. Without a marker a fresh timestamp block is prepended.
pub fn restamp(existing: &str, now: &NaiveDateTime) -> String {
    let stamp = format_timestamp(now);
    let Some(pos) = existing.find(TIMESTAMP_MARKER) else {
        return format!("{TIMESTAMP_MARKER}\n{stamp}\n\n{existing}");
    };

    let after_marker = pos + TIMESTAMP_MARKER.len();
    let value_start = if existing[after_marker..].starts_with('\n') {
        after_marker + 1
    } else {
        after_marker
    };
    let value_end = existing[value_start..]
        .find('\n')
        .map_or(existing.len(), |i| value_start + i);

    let mut out = String::with_capacity(existing.len() + stamp.len());
    out.push_str(&existing[..value_start]);
    out.push_str(&stamp);
    out.push_str(&existing[value_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Venture;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn populated() -> ContextRecord {
        let mut r = ContextRecord::default();
        r.general_memory = "Prefers mornings for deep work".into();
        r.exams.subjects = "Linear Algebra".into();
        r.exams.dates = "Nov 3".into();
        r.primary_work.employer = "Initech".into();
        r.primary_work.priorities = "TPS reports".into();
        r.other_work.notes = "Freelance site".into();
        r.ventures.push(Venture {
            name: "Acme".into(),
            status: "beta".into(),
            ..Default::default()
        });
        r
    }

    #[test]
    fn timestamp_format() {
        assert_eq!(format_timestamp(&at(15, 45)), "Sunday, October 18, 2026 at 03:45 PM");
        assert_eq!(format_timestamp(&at(9, 5)), "Sunday, October 18, 2026 at 09:05 AM");
    }

    #[test]
    fn empty_record_renders_boilerplate_only() {
        let compiler = PromptCompiler::default();
        let out = compiler.compile(&ContextRecord::default(), &at(10, 0));
        for heading in ["GENERAL MEMORY", "EXAMS", "WORK", "STARTUP", "VENTURE"] {
            assert!(!out.contains(heading), "unexpected {heading} in:\n{out}");
        }
        assert_eq!(out.matches(SEPARATOR).count(), 1);
        assert!(out.starts_with("You are Alpha, the personal assistant of the user."));
        assert!(out.ends_with("long-term goals."));
    }

    #[test]
    fn sections_render_in_order_with_labels() {
        let compiler = PromptCompiler::new(PromptProfile {
            assistant_name: "Alpha".into(),
            user_name: "Sam".into(),
        });
        let out = compiler.compile(&populated(), &at(10, 0));

        let order = [
            "**GENERAL MEMORY:**\nPrefers mornings for deep work\n\n---\n\n",
            "**EXAMS:**\nSubjects: Linear Algebra\nExam Dates: Nov 3\n\n---\n\n",
            "**INITECH WORK:**\nPriorities: TPS reports\n\n---\n\n",
            "**OTHER WORK COMMITMENTS:**\nNotes: Freelance site\n\n---\n\n",
            "**ACME STARTUP:**\nCurrent Status: beta\n\n---\n\n",
        ];
        let mut cursor = 0;
        for block in order {
            let idx = out[cursor..]
                .find(block)
                .unwrap_or_else(|| panic!("missing or out of order: {block:?}\n{out}"));
            cursor += idx + block.len();
        }
        assert!(out.contains("help Sam manage their time"));
    }

    #[test]
    fn compile_is_deterministic() {
        let c = PromptCompiler::default();
        assert_eq!(c.compile(&populated(), &at(8, 0)), c.compile(&populated(), &at(8, 0)));
    }

    #[test]
    fn restamp_changes_only_the_timestamp_line() {
        let c = PromptCompiler::default();
        for record in [ContextRecord::default(), populated()] {
            let first = c.compile(&record, &at(8, 15));
            let restamped = restamp(&first, &at(21, 40));
            assert_eq!(restamped, c.compile(&record, &at(21, 40)));

            let before: Vec<&str> = first.lines().collect();
            let after: Vec<&str> = restamped.lines().collect();
            assert_eq!(before.len(), after.len());
            let changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
            assert_eq!(changed.len(), 1);
            assert_eq!(before[changed[0] - 1], TIMESTAMP_MARKER);
        }
    }

    #[test]
    fn restamp_preserves_user_edits() {
        let c = PromptCompiler::default();
        let edited = c
            .compile(&populated(), &at(8, 15))
            .replace("TPS reports", "quarterly review");
        let restamped = restamp(&edited, &at(9, 30));
        assert!(restamped.contains("quarterly review"));
        assert!(restamped.contains("at 09:30 AM"));
        assert!(!restamped.contains("at 08:15 AM"));
    }

    #[test]
    fn restamp_prepends_when_marker_missing() {
        let out = restamp("Be terse.", &at(12, 0));
        assert_eq!(
            out,
            format!("{TIMESTAMP_MARKER}\nSunday, October 18, 2026 at 12:00 PM\n\nBe terse.")
        );
        // Second pass finds the marker and replaces in place.
        let again = restamp(&out, &at(13, 0));
        assert_eq!(again.matches(TIMESTAMP_MARKER).count(), 1);
        assert!(again.ends_with("\n\nBe terse."));
    }

    #[test]
    fn restamp_only_touches_first_marker() {
        let text = format!("{TIMESTAMP_MARKER}\nold\n\n{TIMESTAMP_MARKER}\nkeep\n");
        let out = restamp(&text, &at(12, 0));
        assert!(out.ends_with(&format!("{TIMESTAMP_MARKER}\nkeep\n")));
        assert!(!out.contains("old"));
    }

    #[test]
    fn restamp_handles_marker_at_end_of_text() {
        let out = restamp(&format!("intro\n{TIMESTAMP_MARKER}"), &at(12, 0));
        assert_eq!(out, format!("intro\n{TIMESTAMP_MARKER}Sunday, October 18, 2026 at 12:00 PM"));
    }
}
