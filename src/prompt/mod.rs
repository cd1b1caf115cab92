//! System prompt construction: persona, pipeline reference, dataset profile.

use crate::dataset::DatasetProfile;

/// The complete operation set the sandbox will accept. This text is the
/// contract with the model: anything outside it is rejected.
pub const PIPELINE_REFERENCE: &str = "\
To compute an answer, reply with exactly one fenced code block containing a pipeline.
Stages are separated by `|` or newlines and run left to right:
  select col1, col2, ...
  filter <column> <op> <value>        op: == != > >= < <= contains is_null not_null
  groupby key1, key2 agg fn(col) [as name], ...
  agg fn(col) [as name], ...          fn: sum mean min max median std count n_unique
  sort <column> [desc]
  head N        tail N
  unique
  drop_nulls [col1, col2, ...]
  count                               (row count; must be the final stage)
String values are quoted: filter season == \"Winter\".
There are no other operations. No imports, no file or network access, no host code.
If the question is answered by the dataset profile alone, reply in plain text with no code block.";

pub fn system_prompt(profile: Option<&DatasetProfile>) -> String {
    let mut text = String::from(
        "You are a data analyst answering questions about a CSV dataset loaded in memory.\n\
         Keep responses short and factual. Never invent results: anything numeric must come \
         from running a pipeline.\n\n",
    );
    text.push_str(PIPELINE_REFERENCE);
    match profile {
        Some(p) => {
            text.push_str("\n\nCurrent dataset:\n");
            text.push_str(&p.render());
        }
        None => {
            text.push_str(
                "\n\nNo dataset is currently loaded. Say so and ask the user to load a CSV; \
                 do not emit a pipeline.",
            );
        }
    }
    text
}

/// Sent back to the model when its previous attempt failed, with the error
/// attached so it can fix the pipeline.
pub fn correction_prompt(error: &str) -> String {
    format!(
        "That attempt failed: {}\nReply again with either one corrected pipeline in a fenced \
         code block, or a plain-text answer if the question needs no computation.",
        error
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_missing_dataset() {
        let text = system_prompt(None);
        assert!(text.contains("No dataset is currently loaded"));
    }

    #[test]
    fn prompt_embeds_the_profile() {
        let profile = DatasetProfile {
            rows: 2,
            cols: 1,
            fields: vec![crate::dataset::ColumnProfile {
                name: "city".into(),
                dtype: "str".into(),
                null_count: 0,
            }],
            preview: "shape: (2, 1)".into(),
        };
        let text = system_prompt(Some(&profile));
        assert!(text.contains("2 rows x 1 columns"));
        assert!(text.contains("city"));
    }
}
