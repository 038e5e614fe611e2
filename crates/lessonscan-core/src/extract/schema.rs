//! Static schemas and prompt rendering for each extraction type.

use serde_json::{json, Value};

use super::ExtractionType;

/// Key the model may add to rate its own extraction
pub const SELF_ASSESSMENT_KEY: &str = "confidence";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    List,
    Map,
}

impl FieldKind {
    /// Value used when the model leaves the field out
    pub fn default_value(self) -> Value {
        match self {
            FieldKind::Text => Value::Null,
            FieldKind::List => json!([]),
            FieldKind::Map => json!({}),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Shown to the model next to the key
    pub hint: &'static str,
}

const fn field(name: &'static str, kind: FieldKind, hint: &'static str) -> SchemaField {
    SchemaField { name, kind, hint }
}

#[derive(Debug)]
pub struct ExtractionSchema {
    pub extraction_type: ExtractionType,
    pub instruction: &'static str,
    pub fields: &'static [SchemaField],
}

static EDUCATIONAL_CONTENT: ExtractionSchema = ExtractionSchema {
    extraction_type: ExtractionType::EducationalContent,
    instruction: "Extract educational content with these keys:",
    fields: &[
        field("title", FieldKind::Text, "string - main title or heading"),
        field("subject", FieldKind::Text, "string - academic subject"),
        field("topics", FieldKind::List, "list of key topics/concepts"),
        field("questions", FieldKind::List, "list of questions found"),
        field("answers", FieldKind::List, "list of answers if present"),
        field(
            "difficultyLevel",
            FieldKind::Text,
            "string - beginner/intermediate/advanced",
        ),
        field(
            "contentType",
            FieldKind::Text,
            "string - worksheet/quiz/assignment/notes",
        ),
        field("pageNumber", FieldKind::Text, "string - if present"),
    ],
};

static FORM_DATA: ExtractionSchema = ExtractionSchema {
    extraction_type: ExtractionType::FormData,
    instruction: "Extract form data with these keys:",
    fields: &[
        field("formType", FieldKind::Text, "string - type of form"),
        field("fields", FieldKind::Map, "object mapping field name to field value"),
        field("checkboxes", FieldKind::List, "list of checked items"),
        field("dates", FieldKind::List, "list of dates found"),
        field("signatures", FieldKind::List, "list of signature fields"),
    ],
};

static STUDENT_WORK: ExtractionSchema = ExtractionSchema {
    extraction_type: ExtractionType::StudentWork,
    instruction: "Extract student work information with these keys:",
    fields: &[
        field("studentName", FieldKind::Text, "string - if present"),
        field("assignmentTitle", FieldKind::Text, "string"),
        field("subject", FieldKind::Text, "string"),
        field("responses", FieldKind::List, "list of student answers"),
        field("score", FieldKind::Text, "string - if graded"),
        field("feedback", FieldKind::Text, "string - teacher comments if present"),
        field("date", FieldKind::Text, "string - if present"),
    ],
};

static GENERAL: ExtractionSchema = ExtractionSchema {
    extraction_type: ExtractionType::General,
    instruction: "Extract any structured information you can identify with these keys:",
    fields: &[
        field("mainContent", FieldKind::Text, "string - primary content"),
        field("keyPoints", FieldKind::List, "list of important points"),
        field(
            "entities",
            FieldKind::Map,
            "object with lists: names, dates, numbers, locations",
        ),
        field(
            "documentType",
            FieldKind::Text,
            "string - best guess of document type",
        ),
    ],
};

impl ExtractionSchema {
    pub fn for_type(extraction_type: ExtractionType) -> &'static ExtractionSchema {
        match extraction_type {
            ExtractionType::EducationalContent => &EDUCATIONAL_CONTENT,
            ExtractionType::FormData => &FORM_DATA,
            ExtractionType::StudentWork => &STUDENT_WORK,
            ExtractionType::General => &GENERAL,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }

    /// Render the extraction prompt for `text`.
    pub fn render_prompt(&self, text: &str) -> String {
        let mut keys = String::new();
        for f in self.fields {
            keys.push_str(&format!("  \"{}\": {},\n", f.name, f.hint));
        }
        keys.push_str(&format!(
            "  \"{}\": number between 0 and 1 - how sure you are of this extraction (optional)\n",
            SELF_ASSESSMENT_KEY
        ));

        format!(
            "Extract structured information from the following OCR text.\n\
             Return ONLY a valid JSON object, with no markdown and no commentary.\n\
             Use null for text fields you cannot find and [] for lists with no items.\n\n\
             OCR Text:\n\
             \"\"\"\n{}\n\"\"\"\n\n\
             {}\n{{\n{}}}\n",
            text, self.instruction, keys
        )
    }
}
