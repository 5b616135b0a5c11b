//! Ordered aggregation pipelines
//!
//! Stages are a sum type assembled by [`PipelineBuilder`]; a built
//! [`Pipeline`] is immutable. `to_json` renders the store's aggregation
//! dialect, and [`MemoryStore`](crate::store::MemoryStore) can execute it.

use serde_json::{json, Map, Value};

/// Statuses included in the activity report
pub const REPORT_STATUSES: &[&str] = &["approved", "pending"];

/// Characters of `description` kept in the report
pub const DESCRIPTION_PREVIEW_CHARS: usize = 100;

/// How one output field of a projection is produced
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Copy the field of the same name
    Include,
    /// Copy from another field
    From(String),
    /// First `len` characters of a string field
    Truncate { source: String, len: usize },
    /// Element count of an array field, 0 when missing
    Size { source: String },
}

/// Output fields of a `project` stage, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectSpec {
    fields: Vec<(String, Projection)>,
}

impl ProjectSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, field: &str) -> Self {
        self.fields.push((field.to_string(), Projection::Include));
        self
    }

    pub fn include_all(self, fields: &[&str]) -> Self {
        fields.iter().fold(self, |spec, f| spec.include(f))
    }

    pub fn rename(mut self, output: &str, source: &str) -> Self {
        self.fields
            .push((output.to_string(), Projection::From(source.to_string())));
        self
    }

    pub fn truncate(mut self, field: &str, len: usize) -> Self {
        self.fields.push((
            field.to_string(),
            Projection::Truncate {
                source: field.to_string(),
                len,
            },
        ));
        self
    }

    pub fn size(mut self, output: &str, source: &str) -> Self {
        self.fields.push((
            output.to_string(),
            Projection::Size {
                source: source.to_string(),
            },
        ));
        self
    }

    /// Append an output field produced by `projection`
    pub fn with(mut self, output: &str, projection: Projection) -> Self {
        self.fields.push((output.to_string(), projection));
        self
    }

    pub fn fields(&self) -> &[(String, Projection)] {
        &self.fields
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (output, projection) in &self.fields {
            let rendered = match projection {
                Projection::Include => json!(1),
                Projection::From(source) => json!(format!("${}", source)),
                Projection::Truncate { source, len } => {
                    json!({"$substrCP": [format!("${}", source), 0, len]})
                }
                Projection::Size { source } => {
                    json!({"$size": {"$ifNull": [format!("${}", source), []]}})
                }
            };
            map.insert(output.clone(), rendered);
        }
        Value::Object(map)
    }
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents whose `field` is one of `values`
    Match { field: String, values: Vec<Value> },
    Project(ProjectSpec),
    /// Left outer join against another collection
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        project: ProjectSpec,
        as_field: String,
    },
    /// Flatten an array field into one document per element
    Unwind {
        path: String,
        preserve_null_and_empty: bool,
    },
}

impl Stage {
    pub fn kind(&self) -> &'static str {
        match self {
            Stage::Match { .. } => "match",
            Stage::Project(_) => "project",
            Stage::Lookup { .. } => "lookup",
            Stage::Unwind { .. } => "unwind",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Stage::Match { field, values } => json!({"$match": {field: {"$in": values}}}),
            Stage::Project(spec) => json!({"$project": spec.to_json()}),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                project,
                as_field,
            } => json!({"$lookup": {
                "from": from,
                "localField": local_field,
                "foreignField": foreign_field,
                "pipeline": [{"$project": project.to_json()}],
                "as": as_field,
            }}),
            Stage::Unwind {
                path,
                preserve_null_and_empty,
            } => json!({"$unwind": {
                "path": format!("${}", path),
                "preserveNullAndEmptyArrays": preserve_null_and_empty,
            }}),
        }
    }
}

/// Immutable, ordered stage sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::kind).collect()
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_json).collect())
    }
}

#[derive(Debug, Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_in<V: Into<Value>>(
        mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.stages.push(Stage::Match {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn project(mut self, spec: ProjectSpec) -> Self {
        self.stages.push(Stage::Project(spec));
        self
    }

    pub fn lookup(
        mut self,
        from: &str,
        local_field: &str,
        foreign_field: &str,
        project: ProjectSpec,
        as_field: &str,
    ) -> Self {
        self.stages.push(Stage::Lookup {
            from: from.to_string(),
            local_field: local_field.to_string(),
            foreign_field: foreign_field.to_string(),
            project,
            as_field: as_field.to_string(),
        });
        self
    }

    pub fn unwind(mut self, path: &str, preserve_null_and_empty: bool) -> Self {
        self.stages.push(Stage::Unwind {
            path: path.to_string(),
            preserve_null_and_empty,
        });
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

/// Activity report: approved/pending activities joined with their student
///
/// Matching runs first so every later stage sees only report rows.
pub fn build_report_pipeline() -> Pipeline {
    const ACTIVITY_FIELDS: &[&str] = &[
        "_id",
        "title",
        "status",
        "category",
        "startDate",
        "createdAt",
    ];

    PipelineBuilder::new()
        .match_in("status", REPORT_STATUSES.iter().copied())
        .project(
            ProjectSpec::new()
                .include_all(ACTIVITY_FIELDS)
                .include("studentId")
                .truncate("description", DESCRIPTION_PREVIEW_CHARS)
                .size("attachmentsSize", "attachments"),
        )
        .lookup(
            "users",
            "studentId",
            "_id",
            ProjectSpec::new().include_all(&["name", "email", "department"]),
            "studentInfo",
        )
        .unwind("studentInfo", true)
        .project(
            ProjectSpec::new()
                .include_all(ACTIVITY_FIELDS)
                .include("description")
                .rename("student", "studentInfo")
                .rename("attachmentCount", "attachmentsSize"),
        )
        .build()
}
