//! Step parsing and the fixpoint run loop.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument};

use super::{
    MAX_TIMES, TransformContext, TransformError, TransformOptions, Transformer,
    TransformerRegistry,
};

/// How often a step may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// At most this many passes (0 and 1 both mean one pass).
    Times(u32),
    /// Until the step stops changing, up to [`MAX_TIMES`].
    Unlimited,
}

/// Transformers run together on every pass.
#[derive(Debug, Clone)]
pub struct Step {
    pub transformers: Vec<Arc<dyn Transformer>>,
    pub repeat: Repeat,
}

/// Ordered steps.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Builds a pipeline from explicit steps.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::EmptyPipeline`] when `steps` is empty.
    pub fn new(steps: Vec<Step>) -> Result<Self, TransformError> {
        if steps.is_empty() {
            return Err(TransformError::EmptyPipeline);
        }
        Ok(Self { steps })
    }

    /// Parses step tokens.
    ///
    /// A token with commas is a list of names run as one step; a token that
    /// starts with `-` or a digit is the repeat count of the preceding step;
    /// anything else is a single name. `["a", "b,c", "-1", "d", "2"]` runs
    /// `a` once, `b+c` until stable, then `d` twice.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] for an unknown name, a misplaced or
    /// malformed count, or an empty result.
    pub fn parse<S: AsRef<str>>(
        tokens: &[S],
        registry: &TransformerRegistry,
    ) -> Result<Self, TransformError> {
        let mut steps = Vec::new();
        let mut current: Option<Vec<Arc<dyn Transformer>>> = None;
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }
            if token.starts_with('-') || token.starts_with(|c: char| c.is_ascii_digit()) {
                let times: i64 = token.parse().map_err(|_| TransformError::InvalidStep {
                    arg: token.to_string(),
                    reason: "string starts with - or number is parsed as integer",
                })?;
                let Some(transformers) = current.take() else {
                    return Err(TransformError::InvalidStep {
                        arg: token.to_string(),
                        reason: "times must follow a name or names",
                    });
                };
                let repeat = if times < 0 {
                    Repeat::Unlimited
                } else {
                    Repeat::Times(u32::try_from(times).unwrap_or(u32::MAX))
                };
                steps.push(Step {
                    transformers,
                    repeat,
                });
                continue;
            }
            if let Some(transformers) = current.take() {
                steps.push(Step {
                    transformers,
                    repeat: Repeat::Times(1),
                });
            }
            let transformers = token
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| registry.get(name))
                .collect::<Result<Vec<_>, _>>()?;
            if transformers.is_empty() {
                return Err(TransformError::InvalidStep {
                    arg: token.to_string(),
                    reason: "no transformer names",
                });
            }
            current = Some(transformers);
        }
        if let Some(transformers) = current {
            steps.push(Step {
                transformers,
                repeat: Repeat::Times(1),
            });
        }
        Self::new(steps)
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Runs every step against `dir`. The outcome is in the returned
    /// context's `changed()` and `err()`; the first error stops the run.
    #[instrument(skip(self, dir, options), fields(dir = %dir.display()))]
    pub fn transform(&self, dir: &Path, options: &TransformOptions) -> TransformContext {
        let mut ctx = TransformContext::new(dir, options.clone());
        if let Err(err) = ctx.open_log() {
            ctx.fail(err);
            return ctx;
        }
        ctx.log(format!("[dir {dir:?}]Start transforms"));
        self.run_steps(&mut ctx);
        ctx.set_current(None);
        let summary = format!(
            "[dir {dir:?}]All transforms completed, changed={}, err={}",
            ctx.changed(),
            ctx.err().map_or_else(|| "<nil>".to_string(), ToString::to_string)
        );
        ctx.log(summary);
        ctx.close_log();
        debug!(changed = ctx.changed(), failed = ctx.err().is_some(), "Transform finished");
        ctx
    }

    fn run_steps(&self, ctx: &mut TransformContext) {
        'steps: for step in &self.steps {
            let mut passes = 0u32;
            loop {
                let last = step.transformers.len().saturating_sub(1);
                for (index, transformer) in step.transformers.iter().enumerate() {
                    ctx.set_current(Some(transformer.name()));
                    ctx.log("Start");
                    let result = transformer.apply(ctx);
                    match result {
                        Ok(changed) => {
                            if changed {
                                ctx.mark_changed();
                            }
                            ctx.log(format!("Finished with changed={changed}, err=<nil>"));
                            if !changed && index == last {
                                continue 'steps;
                            }
                        }
                        Err(err) => {
                            ctx.log(format!("Finished with changed=false, err={err}"));
                            ctx.fail(TransformError::Transformer {
                                name: transformer.name().to_string(),
                                source: Box::new(err),
                            });
                            break 'steps;
                        }
                    }
                }
                passes += 1;
                match step.repeat {
                    Repeat::Times(times) if passes >= times => continue 'steps,
                    Repeat::Unlimited if passes >= MAX_TIMES => {
                        ctx.set_current(None);
                        ctx.fail(TransformError::LoopTooManyTimes);
                        break 'steps;
                    }
                    _ => {}
                }
            }
        }
    }
}
