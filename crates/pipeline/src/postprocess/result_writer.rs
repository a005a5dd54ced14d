use crate::components::{AnswerPostprocessor, Component};
use answerforge_common::config::ResultsFormat;
use answerforge_common::ranking::csv_field;
use answerforge_common::{AppConfig, AppError, CandidateAnswer, CorrectAnswer, Question, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

const DEFAULT_HEADER: &str = "QID\tAnswerLabel\tConfidence\tIsCorrect";
const VERBOSE_HEADER: &str = "QID\tQuestionText\tAnswerLabel\tAnswerTitle\tConfidence\tIsCorrect";

/// Writes the final ranked answers of every question to a results file.
///
/// - `default`: one TSV row per answer
/// - `verbose`: TSV with question text and answer title
/// - `competition`: one headerless CSV row per question, `qid,label,conf,...`
pub struct ResultWriter {
    id: String,
    state: Mutex<Option<WriterState>>,
}

struct WriterState {
    path: PathBuf,
    format: ResultsFormat,
    out: BufWriter<File>,
    questions: u64,
}

impl ResultWriter {
    pub fn new() -> Self {
        Self {
            id: "result-writer".to_string(),
            state: Mutex::new(None),
        }
    }

    fn write_rows(
        state: &mut WriterState,
        question: &Question,
        answers: &[CandidateAnswer],
        correct: Option<&[CorrectAnswer]>,
    ) -> std::io::Result<()> {
        let is_correct = |answer: &CandidateAnswer| correct.is_some_and(|c| answer.is_correct(c));

        match state.format {
            ResultsFormat::Default => {
                for answer in answers {
                    writeln!(
                        state.out,
                        "{}\t{}\t{}\t{}",
                        question.id,
                        tsv_field(&answer.label),
                        answer.confidence.unwrap_or(0.0),
                        is_correct(answer)
                    )?;
                }
            }
            ResultsFormat::Verbose => {
                for answer in answers {
                    let title = answer
                        .payload()
                        .and_then(|p| p.title.as_ref())
                        .map(|t| t.text.as_str())
                        .unwrap_or("");
                    writeln!(
                        state.out,
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        question.id,
                        tsv_field(&question.text.text),
                        tsv_field(&answer.label),
                        tsv_field(title),
                        answer.confidence.unwrap_or(0.0),
                        is_correct(answer)
                    )?;
                }
            }
            ResultsFormat::Competition => {
                write!(state.out, "{}", csv_field(&question.id))?;
                for answer in answers {
                    write!(
                        state.out,
                        ",{},{}",
                        csv_field(&answer.label),
                        answer.confidence.unwrap_or(0.0)
                    )?;
                }
                writeln!(state.out)?;
            }
        }
        Ok(())
    }
}

impl Default for ResultWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn tsv_field(raw: &str) -> String {
    raw.replace(['\t', '\n', '\r'], " ")
}

#[async_trait]
impl Component for ResultWriter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self, config: &AppConfig) -> Result<()> {
        let path = config.results.path.clone().ok_or_else(|| AppError::MissingOption {
            option: "results.path".to_string(),
        })?;
        let format = config.results.format;

        let mut out = BufWriter::new(File::create(&path)?);
        match format {
            ResultsFormat::Default => writeln!(out, "{}", DEFAULT_HEADER)?,
            ResultsFormat::Verbose => writeln!(out, "{}", VERBOSE_HEADER)?,
            ResultsFormat::Competition => {}
        }

        info!(path = %path.display(), ?format, "Result writer opened");
        *self.state.lock() = Some(WriterState {
            path,
            format,
            out,
            questions: 0,
        });
        Ok(())
    }
}

#[async_trait]
impl AnswerPostprocessor for ResultWriter {
    async fn postprocess(
        &self,
        question: &Question,
        answers: &[CandidateAnswer],
        correct: Option<&[CorrectAnswer]>,
    ) -> Result<()> {
        let mut guard = self.state.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| AppError::config("result writer is not open"))?;

        Self::write_rows(state, question, answers, correct)?;
        state.questions += 1;
        Ok(())
    }

    async fn finish_postprocessing(&self) -> Result<()> {
        let Some(mut state) = self.state.lock().take() else {
            return Ok(());
        };
        state.out.flush()?;
        info!(
            path = %state.path.display(),
            questions = state.questions,
            "Results written"
        );
        Ok(())
    }
}
