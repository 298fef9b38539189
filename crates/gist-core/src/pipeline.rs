//! Query stages.
//!
//! Planning and validation are stages that take a query specification and
//! return a (possibly modified) copy. Stages compose into a pipeline run in
//! registration order.

use crate::error::GistResult;
use crate::query::GistQuery;

/// One step between request parsing and compilation.
pub trait QueryStage {
    /// Name used in logs
    fn name(&self) -> &'static str;

    fn apply(&self, query: GistQuery) -> GistResult<GistQuery>;
}

/// Ordered list of stages.
#[derive(Default)]
pub struct StagePipeline<'a> {
    stages: Vec<Box<dyn QueryStage + 'a>>,
}

impl<'a> StagePipeline<'a> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn with_stage(mut self, stage: impl QueryStage + 'a) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Run every stage in order, stopping at the first failure
    pub fn run(&self, query: GistQuery) -> GistResult<GistQuery> {
        self.stages.iter().try_fold(query, |query, stage| {
            tracing::trace!(stage = stage.name(), "applying query stage");
            stage.apply(query)
        })
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GistError;
    use crate::query::Field;

    struct AppendField(&'static str);

    impl QueryStage for AppendField {
        fn name(&self) -> &'static str {
            "append"
        }

        fn apply(&self, query: GistQuery) -> GistResult<GistQuery> {
            Ok(query.with_field(Field::new(self.0)))
        }
    }

    struct Reject;

    impl QueryStage for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn apply(&self, _query: GistQuery) -> GistResult<GistQuery> {
            Err(GistError::Validation("rejected".into()))
        }
    }

    #[test]
    fn test_stages_run_in_order() {
        let pipeline = StagePipeline::new()
            .with_stage(AppendField("a"))
            .with_stage(AppendField("b"));
        let query = pipeline.run(GistQuery::new("User")).unwrap();
        let paths: Vec<_> = query.fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);
        assert_eq!(pipeline.stage_names(), vec!["append", "append"]);
    }

    #[test]
    fn test_pipeline_stops_at_first_failure() {
        let pipeline = StagePipeline::new()
            .with_stage(Reject)
            .with_stage(AppendField("never"));
        assert!(pipeline.run(GistQuery::new("User")).is_err());
    }
}
