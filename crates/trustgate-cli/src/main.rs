//! Trustgate CLI - classify text and inspect pipeline behavior

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::info;
use trustgate_core::{
    ChainOfTrustShield, CollaboratorError, DelimiterStyle, DetectionOrchestrator, DetectionRequest,
    OutputCheck, OutputValidator, ProtectedLogic, SpotlightTransform, TrustgateConfig,
};

#[derive(Parser)]
#[command(name = "trustgate")]
#[command(about = "Trustgate - adaptive multi-layer prompt-injection guard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Classify one input through the detection pipeline
    Scan {
        /// Text to classify
        text: String,
        /// Disable the fast-path matcher
        #[arg(long)]
        no_fast_path: bool,
        /// Emit the full verdict as JSON
        #[arg(long)]
        json: bool,
    },
    /// Wrap text in spotlight delimiters and show the result
    Spotlight {
        /// Text to wrap
        text: String,
        /// Delimiter style: brackets, xml_tags, markers, quotes, structured
        #[arg(short, long, default_value = "brackets")]
        style: String,
    },
    /// Run one input through the full chain-of-trust shield
    Demo {
        /// Text to process
        text: String,
    },
    /// Show the default configuration as JSON
    Config,
}

/// Stand-in for the guarded downstream model.
struct EchoLogic;

#[async_trait]
impl ProtectedLogic for EchoLogic {
    async fn invoke(&self, input: &str) -> Result<String, CollaboratorError> {
        Ok(format!("(echo) received {} chars of spotlighted input", input.len()))
    }
}

/// Output validator that accepts everything; the boundary check in the
/// shield still applies.
struct PermissiveValidator;

#[async_trait]
impl OutputValidator for PermissiveValidator {
    async fn validate(
        &self,
        _output: &str,
        _original_input: &str,
    ) -> Result<OutputCheck, CollaboratorError> {
        Ok(OutputCheck {
            is_safe: true,
            violation_type: "none".to_string(),
            confidence: 0.9,
            details: "no validator configured, output accepted".to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match cli.command {
        Some(Commands::Scan {
            text,
            no_fast_path,
            json,
        }) => {
            let mut config = TrustgateConfig::default();
            config.global.fast_path_enabled = !no_fast_path;
            let orchestrator = DetectionOrchestrator::builder(config).build();
            let started = std::time::Instant::now();
            let verdict = orchestrator.classify(&DetectionRequest::new(text)).await;
            info!(
                is_threat = verdict.is_threat,
                method = %verdict.detection_method,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "classification complete"
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                println!(
                    "{}: {} (confidence {:.2}, via {})",
                    if verdict.is_threat { "THREAT" } else { "SAFE" },
                    verdict.threat_type,
                    verdict.confidence,
                    verdict.detection_method
                );
                println!("  {}", verdict.reasoning);
            }
        }
        Some(Commands::Spotlight { text, style }) => {
            let style: DelimiterStyle =
                serde_json::from_value(serde_json::Value::String(style.clone()))
                    .map_err(|_| anyhow::anyhow!("unknown delimiter style: {style}"))?;
            let transform = SpotlightTransform::new(style, true, false);
            let wrapped = transform.wrap("", &text);
            if !wrapped.escape.is_safe {
                eprintln!("warning: boundary escape attempts detected: {:?}", wrapped.escape.attempts);
            }
            println!("{}", wrapped.user_input);
        }
        Some(Commands::Demo { text }) => {
            let mut config = TrustgateConfig::default();
            config.global.failure_log_path = std::env::temp_dir().join("trustgate_demo_failures.jsonl");
            let detector = Arc::new(DetectionOrchestrator::builder(config.clone()).build());
            let shield = ChainOfTrustShield::new(
                &config,
                detector,
                Arc::new(EchoLogic),
                Arc::new(PermissiveValidator),
            )?;

            let outcome = shield.process(DetectionRequest::new(text)).await;
            info!(stage = ?outcome.stage, is_trusted = outcome.is_trusted, "shield run complete");
            println!("stage:    {:?}", outcome.stage);
            println!("trusted:  {}", outcome.is_trusted);
            println!("reason:   {}", outcome.reasoning);
            if let Some(response) = outcome.response {
                println!("response: {response}");
            }
        }
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&TrustgateConfig::default())?);
        }
        None => {
            println!("Trustgate v0.1.0 - Use --help for commands");
        }
    }

    Ok(())
}
