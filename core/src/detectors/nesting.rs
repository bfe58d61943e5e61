use crate::error::DetectorError;
use crate::report::{Category, Finding};

use super::{Detector, FileContext};

/// One finding per function whose control-structure nesting exceeds `max_nesting_depth`.
pub struct NestingDetector;

impl Detector for NestingDetector {
    fn id(&self) -> &'static str {
        "nesting"
    }

    fn base_confidence(&self) -> f64 {
        0.9
    }

    fn rule_ids(&self) -> Vec<String> {
        vec!["nesting/deep-nesting".into()]
    }

    fn detect(&self, ctx: &FileContext<'_>) -> Result<Vec<Finding>, DetectorError> {
        let max = ctx.config.thresholds.max_nesting_depth;
        Ok(ctx
            .metrics
            .functions
            .iter()
            .filter_map(|unit| {
                let severity = ctx.config.severity.classify(unit.nesting_depth, max)?;
                Some(Finding::new(
                    "nesting/deep-nesting",
                    Category::Nesting,
                    severity,
                    ctx.path,
                    unit.range(),
                    format!(
                        "`{}` nests control flow {} levels deep (threshold {max}); extract the inner blocks or return early",
                        unit.name, unit.nesting_depth
                    ),
                ))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::language::Language;
    use crate::metrics::extract;
    use crate::normalize::normalize;
    use crate::report::LineRange;

    #[test]
    fn six_levels_against_four() {
        let src = "\
function walk(a) {
  if (a) {
    for (const b of a) {
      while (b.next) {
        if (b.ok) {
          try {
            if (b.done) {
              return b;
            }
          } catch (e) {
            return null;
          }
        }
      }
    }
  }
}
";
        let stream = normalize(src, Language::JavaScript);
        let metrics = extract(&stream);
        let config = Config::default();
        let ctx = FileContext {
            path: "walk.js",
            language: Language::JavaScript,
            stream: &stream,
            metrics: &metrics,
            config: &config,
        };
        let findings = NestingDetector.detect(&ctx).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].range, LineRange::new(1, 17));
        assert!(findings[0].message.contains("6 levels"));
    }
}
