//! Google Classroom coursework payloads built from extracted educational content.
//!
//! Only the payload is built here; uploading it is the caller's business.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::StructuredData;

/// Points per quiz question
const QUIZ_POINTS_PER_QUESTION: u32 = 10;
const ASSIGNMENT_POINTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseWorkKind {
    /// Reading material, ungraded
    Material,
    /// One graded item per question; needs at least one question
    Quiz,
    Assignment,
}

impl std::str::FromStr for CourseWorkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "material" => Ok(CourseWorkKind::Material),
            "quiz" => Ok(CourseWorkKind::Quiz),
            "assignment" => Ok(CourseWorkKind::Assignment),
            other => Err(format!(
                "unknown coursework kind '{}' (expected material, quiz or assignment)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl From<NaiveDate> for DueDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

/// Classroom `courseWork` resource body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseWork {
    pub title: String,
    pub description: String,
    pub work_type: String,
    pub state: String,
    pub max_points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DueDate>,
}

/// Convert `educational_content` data into a coursework payload.
///
/// A quiz without questions becomes an assignment. The due date is
/// `today + due_in_days`; zero days means no due date.
pub fn to_coursework(
    data: &StructuredData,
    kind: CourseWorkKind,
    due_in_days: Option<u32>,
    today: NaiveDate,
) -> CourseWork {
    let questions = list_field(data, "questions");

    let (title, description, max_points) = match kind {
        CourseWorkKind::Material => material(data),
        CourseWorkKind::Quiz if !questions.is_empty() => quiz(data, &questions),
        CourseWorkKind::Quiz | CourseWorkKind::Assignment => assignment(data),
    };

    let due_date = due_in_days
        .filter(|days| *days > 0)
        .and_then(|days| today.checked_add_days(Days::new(u64::from(days))))
        .map(DueDate::from);

    CourseWork {
        title,
        description,
        work_type: "ASSIGNMENT".to_string(),
        state: "PUBLISHED".to_string(),
        max_points,
        due_date,
    }
}

fn material(data: &StructuredData) -> (String, String, u32) {
    let title = text_field(data, "title", "Educational Material");
    let subject = text_field(data, "subject", "General");
    let topics = list_field(data, "topics");

    let mut description = format!("**Subject:** {}\n\n", subject);
    if !topics.is_empty() {
        description.push_str("**Key Topics:**\n");
        for (i, topic) in topics.iter().enumerate() {
            description.push_str(&format!("{}. {}\n", i + 1, topic));
        }
        description.push('\n');
    }
    description.push_str(&format!(
        "**Content Type:** {}\n",
        text_field(data, "contentType", "Notes")
    ));
    description.push_str(&format!(
        "**Difficulty Level:** {}\n",
        text_field(data, "difficultyLevel", "Not specified")
    ));

    (format!("{} - {}", title, subject), description, 0)
}

fn quiz(data: &StructuredData, questions: &[String]) -> (String, String, u32) {
    let title = text_field(data, "title", "Quiz");
    let answers = list_field_keep_empty(data, "answers");

    let mut description = format!("**Quiz: {}**\n\n", title);
    for (i, question) in questions.iter().enumerate() {
        description.push_str(&format!("**Question {}:** {}\n", i + 1, question));
        if let Some(answer) = answers.get(i).filter(|a| !a.is_empty()) {
            description.push_str(&format!("**Answer:** {}\n", answer));
        }
        description.push('\n');
    }

    let max_points = QUIZ_POINTS_PER_QUESTION.saturating_mul(questions.len() as u32);
    (format!("Quiz: {}", title), description, max_points)
}

fn assignment(data: &StructuredData) -> (String, String, u32) {
    let title = text_field(data, "title", "Assignment");
    let subject = text_field(data, "subject", "General");
    let topics = list_field(data, "topics");

    let mut description = format!("**Assignment: {}**\n\n**Subject:** {}\n\n", title, subject);
    if !topics.is_empty() {
        description.push_str("**Topics to Cover:**\n");
        for topic in &topics {
            description.push_str(&format!("• {}\n", topic));
        }
    }

    (format!("{} - {}", title, subject), description, ASSIGNMENT_POINTS)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn text_field(data: &StructuredData, key: &str, default: &str) -> String {
    data.get(key)
        .map(value_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// List items as text, blanks dropped
fn list_field(data: &StructuredData, key: &str) -> Vec<String> {
    list_field_keep_empty(data, key)
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect()
}

/// List items as text, positions preserved
fn list_field_keep_empty(data: &StructuredData, key: &str) -> Vec<String> {
    match data.get(key) {
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> StructuredData {
        value.as_object().cloned().unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 30).unwrap()
    }

    #[test]
    fn test_material_format() {
        let data = data(json!({
            "title": "Photosynthesis",
            "subject": "Biology",
            "topics": ["light reactions", "Calvin cycle"],
            "contentType": "notes",
            "difficultyLevel": null
        }));

        let work = to_coursework(&data, CourseWorkKind::Material, None, today());

        assert_eq!(work.title, "Photosynthesis - Biology");
        assert_eq!(
            work.description,
            "**Subject:** Biology\n\n**Key Topics:**\n1. light reactions\n2. Calvin cycle\n\n\
             **Content Type:** notes\n**Difficulty Level:** Not specified\n"
        );
        assert_eq!(work.max_points, 0);
        assert_eq!(work.work_type, "ASSIGNMENT");
        assert_eq!(work.state, "PUBLISHED");
        assert!(work.due_date.is_none());
    }

    #[test]
    fn test_quiz_format_with_answers() {
        let data = data(json!({
            "title": "Math Quiz",
            "questions": ["2+2=?", "5-3=?", "3x3=?"],
            "answers": ["4", "", "9"]
        }));

        let work = to_coursework(&data, CourseWorkKind::Quiz, Some(7), today());

        assert_eq!(work.title, "Quiz: Math Quiz");
        assert_eq!(
            work.description,
            "**Quiz: Math Quiz**\n\n\
             **Question 1:** 2+2=?\n**Answer:** 4\n\n\
             **Question 2:** 5-3=?\n\n\
             **Question 3:** 3x3=?\n**Answer:** 9\n\n"
        );
        assert_eq!(work.max_points, 30);
        assert_eq!(
            work.due_date,
            Some(DueDate {
                year: 2024,
                month: 2,
                day: 6
            })
        );
    }

    #[test]
    fn test_quiz_without_questions_becomes_assignment() {
        let data = data(json!({"title": "Reading", "questions": [], "topics": ["chapter 1"]}));

        let work = to_coursework(&data, CourseWorkKind::Quiz, None, today());

        assert_eq!(work.title, "Reading - General");
        assert_eq!(
            work.description,
            "**Assignment: Reading**\n\n**Subject:** General\n\n**Topics to Cover:**\n• chapter 1\n"
        );
        assert_eq!(work.max_points, 100);
    }

    #[test]
    fn test_defaults_for_empty_data() {
        let empty = StructuredData::new();

        assert_eq!(
            to_coursework(&empty, CourseWorkKind::Material, None, today()).title,
            "Educational Material - General"
        );
        assert_eq!(
            to_coursework(&empty, CourseWorkKind::Assignment, None, today()).title,
            "Assignment - General"
        );
    }

    #[test]
    fn test_zero_due_days_means_no_due_date() {
        let work = to_coursework(&StructuredData::new(), CourseWorkKind::Assignment, Some(0), today());
        assert!(work.due_date.is_none());
    }

    #[test]
    fn test_payload_serialization() {
        let work = to_coursework(&StructuredData::new(), CourseWorkKind::Assignment, Some(1), today());
        let json = serde_json::to_value(&work).unwrap();

        assert_eq!(json["workType"], "ASSIGNMENT");
        assert_eq!(json["maxPoints"], 100);
        assert_eq!(json["dueDate"], json!({"year": 2024, "month": 1, "day": 31}));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Quiz".parse::<CourseWorkKind>(), Ok(CourseWorkKind::Quiz));
        assert!("worksheet".parse::<CourseWorkKind>().is_err());
    }
}
