//! Runs the Nutri-AI team evaluations.
//!
//! Usage: `nutri-eval [accuracy|performance|all]` (default `all`).
//! Exits with status 1 when the accuracy evaluation does not pass.

use dotenv::dotenv;
use std::process::ExitCode;

use nutri_backend::ai::AiClient;
use nutri_backend::config::Config;
use nutri_backend::context::AppContext;
use nutri_backend::eval::{AccuracyEval, AccuracyVerdict, PerformanceEval};
use nutri_backend::team::create_team;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Accuracy,
    Performance,
    All,
}

fn parse_mode(arg: Option<&str>) -> Option<Mode> {
    match arg.unwrap_or("all") {
        "accuracy" => Some(Mode::Accuracy),
        "performance" => Some(Mode::Performance),
        "all" => Some(Mode::All),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    let arg = std::env::args().nth(1);
    let mode = match parse_mode(arg.as_deref()) {
        Some(mode) => mode,
        None => {
            eprintln!("Usage: nutri-eval [accuracy|performance|all]");
            return ExitCode::from(2);
        }
    };

    let config = Config::from_env();
    let context = match AppContext::new(config.clone()) {
        Ok(context) => context,
        Err(e) => {
            log::error!("[EVAL] Failed to create agents: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut passed = true;

    if matches!(mode, Mode::Performance | Mode::All) {
        let perf = PerformanceEval::new("create_team")
            .with_iterations(1)
            .with_warmup_runs(0);
        match perf.run(|| create_team(&context)) {
            Ok(result) => println!("{}", result.summary()),
            Err(e) => {
                log::error!("[EVAL] Performance evaluation failed: {}", e);
                passed = false;
            }
        }
    }

    if matches!(mode, Mode::Accuracy | Mode::All) {
        let verdict = match (create_team(&context), AiClient::from_config(&config, &config.model)) {
            (Ok(team), Ok(judge)) => {
                let result = AccuracyEval::new(judge).run(&team).await;
                if let Some(result) = &result {
                    print!("{}", result.summary());
                }
                AccuracyVerdict::from_result(result.as_ref())
            }
            (Err(e), _) | (_, Err(e)) => {
                log::error!("[EVAL] Failed to set up accuracy evaluation: {}", e);
                AccuracyVerdict::NoResult
            }
        };

        if verdict.passed() {
            println!("{}", verdict.message());
        } else {
            println!("WARNING: {}", verdict.message());
            passed = false;
        }
    }

    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode(None), Some(Mode::All));
        assert_eq!(parse_mode(Some("accuracy")), Some(Mode::Accuracy));
        assert_eq!(parse_mode(Some("performance")), Some(Mode::Performance));
        assert_eq!(parse_mode(Some("speed")), None);
    }
}
