//! Runs every sanitizer over one document in a fixed order.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::dom::Document;
use crate::error::SanitizerResult;
use crate::layout::AttachmentMetadata;
use crate::ledger::ErrorLedger;
use crate::sanitizer::{
    layout, media, scripts, styles, LayoutSanitizer, MediaSanitizer, Reporter, Sanitizer,
    ScriptSanitizer, StyleSanitizer,
};
use crate::stylesheet::{Scripts, Stylesheets};
use crate::validation::{ErrorContext, ValidationError, ValidationErrorSink};

/// Everything one run produced besides the mutated tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizeOutcome {
    pub errors: Vec<ValidationError>,
    pub stylesheets: Stylesheets,
    pub scripts: Scripts,
}

impl SanitizeOutcome {
    /// Errors whose markup is still in the tree.
    pub fn kept_errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(|e| !e.status.is_accepted())
    }

    pub fn has_kept_errors(&self) -> bool {
        self.kept_errors().next().is_some()
    }
}

pub struct Pipeline {
    sanitizers: Vec<Box<dyn Sanitizer>>,
}

impl Pipeline {
    /// Build media, layout, scripts and styles sanitizers, in that order.
    /// Attachment dimensions come from the config's `attachments` table.
    pub fn new(config: &PipelineConfig) -> SanitizerResult<Self> {
        Self::with_metadata(config, Arc::new(config.attachment_metadata()))
    }

    pub fn with_metadata(
        config: &PipelineConfig,
        metadata: Arc<dyn AttachmentMetadata>,
    ) -> SanitizerResult<Self> {
        let sanitizers: Vec<Box<dyn Sanitizer>> = vec![
            Box::new(MediaSanitizer::new(&config.overrides_for(media::NAME)?)?),
            Box::new(LayoutSanitizer::new(
                &config.overrides_for(layout::NAME)?,
                metadata,
            )?),
            Box::new(ScriptSanitizer::new(&config.overrides_for(scripts::NAME)?)?),
            Box::new(StyleSanitizer::new(&config.overrides_for(styles::NAME)?)?),
        ];
        Ok(Self { sanitizers })
    }

    pub fn sanitizer_names(&self) -> Vec<&'static str> {
        self.sanitizers.iter().map(|s| s.name()).collect()
    }

    pub fn sanitizers(&self) -> &[Box<dyn Sanitizer>] {
        &self.sanitizers
    }

    /// Run every pass. Without a sink, errors are only collected and every
    /// violation takes its default disposition.
    pub fn run(
        &mut self,
        doc: &mut Document,
        context: ErrorContext,
        sink: Option<&mut dyn ValidationErrorSink>,
    ) -> SanitizeOutcome {
        let mut reporter = match sink {
            Some(sink) => Reporter::with_sink(sink, context),
            None => Reporter::new(context),
        };
        let mut outcome = SanitizeOutcome::default();

        for sanitizer in self.sanitizers.iter_mut() {
            sanitizer.sanitize(doc, &mut reporter);
            let errors = reporter.take_emitted();
            log::debug!("{} pass: {} error(s)", sanitizer.name(), errors.len());
            outcome.errors.extend(errors);
            outcome.stylesheets.extend(sanitizer.get_stylesheets());
            outcome.scripts.merge(sanitizer.get_scripts());
        }

        log::info!(
            "sanitized document: {} error(s), {} kept, {} stylesheet(s), {} script(s)",
            outcome.errors.len(),
            outcome.kept_errors().count(),
            outcome.stylesheets.len(),
            outcome.scripts.len()
        );
        outcome
    }

    /// Run against a ledger, pruning records the run no longer produces.
    pub fn run_with_ledger(
        &mut self,
        doc: &mut Document,
        context: ErrorContext,
        ledger: &mut ErrorLedger,
    ) -> SanitizeOutcome {
        ledger.begin_run();
        let outcome = self.run(doc, context, Some(&mut *ledger as &mut dyn ValidationErrorSink));
        ledger.finish_run();
        outcome
    }
}
