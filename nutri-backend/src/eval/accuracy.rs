//! LLM-judged accuracy of the team's answer against an expected description.

use crate::ai::{AiClient, Message};
use crate::team::Team;
use crate::tools::ToolContext;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const EVAL_INPUT: &str = "I would like to know the nutritional value of chicken. Please give me alternative foods as well and a summary.";
pub const EVAL_EXPECTED_OUTPUT: &str = "Uses numeric evidence and tables to display the nutritional information of the food. Provides a summary and bullet list of alternative options.";

/// Average score below this fails the evaluation
pub const PASS_THRESHOLD: f64 = 8.0;

static JSON_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid json object regex"));

/// The judge's verdict on one answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgement {
    pub score: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccuracyEvaluation {
    pub input: String,
    pub output: String,
    pub expected_output: String,
    pub score: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccuracyResult {
    pub results: Vec<AccuracyEvaluation>,
    pub avg_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub std_dev_score: f64,
}

impl AccuracyResult {
    /// None when there is nothing to aggregate
    pub fn from_evaluations(results: Vec<AccuracyEvaluation>) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        let scores: Vec<f64> = results.iter().map(|r| r.score as f64).collect();
        Some(AccuracyResult {
            avg_score: super::mean(&scores),
            min_score: super::min(&scores),
            max_score: super::max(&scores),
            std_dev_score: super::std_dev(&scores),
            results,
        })
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "Accuracy over {} run(s): avg {:.2}, min {:.0}, max {:.0}, std dev {:.2}\n",
            self.results.len(),
            self.avg_score,
            self.min_score,
            self.max_score,
            self.std_dev_score
        );
        for (i, r) in self.results.iter().enumerate() {
            text.push_str(&format!("  #{} score {}/10: {}\n", i + 1, r.score, r.reason));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccuracyVerdict {
    NoResult,
    ScoreTooLow(f64),
    Passed(f64),
}

impl AccuracyVerdict {
    pub fn from_result(result: Option<&AccuracyResult>) -> Self {
        match result {
            None => AccuracyVerdict::NoResult,
            Some(r) if r.avg_score < PASS_THRESHOLD => AccuracyVerdict::ScoreTooLow(r.avg_score),
            Some(r) => AccuracyVerdict::Passed(r.avg_score),
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, AccuracyVerdict::Passed(_))
    }

    pub fn message(&self) -> String {
        match self {
            AccuracyVerdict::NoResult => "Evaluation failed or returned no result".to_string(),
            AccuracyVerdict::ScoreTooLow(score) => format!("Evaluation score too low: {:.2}", score),
            AccuracyVerdict::Passed(_) => "Evaluation passed".to_string(),
        }
    }
}

pub struct AccuracyEval {
    judge: AiClient,
    pub input: String,
    pub expected_output: String,
    pub num_iterations: usize,
}

impl AccuracyEval {
    /// Evaluation with the fixed chicken prompt and a single iteration
    pub fn new(judge: AiClient) -> Self {
        AccuracyEval {
            judge,
            input: EVAL_INPUT.to_string(),
            expected_output: EVAL_EXPECTED_OUTPUT.to_string(),
            num_iterations: 1,
        }
    }

    pub fn with_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations.max(1);
        self
    }

    /// Run the team `num_iterations` times and have the judge score each
    /// answer. Iterations whose team run or judgement fails are skipped.
    pub async fn run(&self, team: &Team) -> Option<AccuracyResult> {
        let mut evaluations = Vec::with_capacity(self.num_iterations);

        for i in 1..=self.num_iterations {
            let context = ToolContext::new(format!("eval-{}", uuid::Uuid::new_v4()), None);
            let output = match team.run(&self.input, &context).await {
                Ok(output) => output.content,
                Err(e) => {
                    log::error!("[EVAL] Iteration {} team run failed: {}", i, e);
                    continue;
                }
            };

            match self.judge(&output).await {
                Ok(judgement) => {
                    log::info!("[EVAL] Iteration {} scored {}/10", i, judgement.score);
                    evaluations.push(AccuracyEvaluation {
                        input: self.input.clone(),
                        output,
                        expected_output: self.expected_output.clone(),
                        score: judgement.score,
                        reason: judgement.reason,
                    });
                }
                Err(e) => log::error!("[EVAL] Iteration {} judgement failed: {}", i, e),
            }
        }

        AccuracyResult::from_evaluations(evaluations)
    }

    async fn judge(&self, output: &str) -> Result<Judgement, String> {
        let messages = vec![
            Message::system(JUDGE_INSTRUCTIONS),
            Message::user(judge_prompt(&self.input, output, &self.expected_output)),
        ];
        let reply = self
            .judge
            .generate_text(messages)
            .await
            .map_err(|e| e.to_string())?;
        parse_judgement(&reply)
    }
}

const JUDGE_INSTRUCTIONS: &str = "\
You are an expert judge evaluating the accuracy of an AI agent's answer.
Compare the agent's output to the expected output and score it from 1 to 10:
- 10: fully matches the expected output in content and form
- 7-9: mostly matches, minor omissions
- 4-6: partially matches, important parts missing
- 1-3: does not match or is incorrect
Respond only with JSON: {\"score\": <1-10>, \"reason\": \"<short justification>\"}";

fn judge_prompt(input: &str, output: &str, expected_output: &str) -> String {
    format!(
        "<agent_input>\n{}\n</agent_input>\n\n<expected_output>\n{}\n</expected_output>\n\n<agent_output>\n{}\n</agent_output>",
        input, expected_output, output
    )
}

/// Extract the judge's JSON verdict, tolerating prose or code fences around it
pub fn parse_judgement(reply: &str) -> Result<Judgement, String> {
    let json = JSON_OBJECT_RE
        .find(reply)
        .map(|m| m.as_str())
        .ok_or_else(|| format!("no JSON object in judge reply: {}", crate::util::truncate(reply, 200)))?;

    let judgement: Judgement =
        serde_json::from_str(json).map_err(|e| format!("invalid judge JSON: {}", e))?;
    if !(1..=10).contains(&judgement.score) {
        return Err(format!("judge score {} outside 1-10", judgement.score));
    }
    Ok(judgement)
}
