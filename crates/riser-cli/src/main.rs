//! Early Riser CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 뉴스 헤드라인 조회 (5분 캐시, 파일 저장)
//! riser fetch -p news -e top-headlines -q country=us --ttl news --persist
//!
//! # 캐시 통계
//! riser stats
//!
//! # 시세 캐시만 무효화
//! riser invalidate --pattern '^quote:'
//!
//! # 설정 점검
//! riser check-config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use riser_cache::TtlClass;
use riser_core::{init_logging, AppConfig, LogConfig};

mod commands;

use commands::fetch::{parse_param, FetchArgs};

#[derive(Parser)]
#[command(name = "riser")]
#[command(about = "Early Riser - 캐시 우선 시장 데이터 조회 도구", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 캐시를 거쳐 업스트림 데이터 조회
    Fetch {
        /// 제공자 이름 (설정의 [providers.<name>])
        #[arg(short, long)]
        provider: String,

        /// 엔드포인트 경로 (예: top-headlines)
        #[arg(short, long)]
        endpoint: String,

        /// 캐시 키 (기본: <provider>:<endpoint>?<params>)
        #[arg(short, long)]
        key: Option<String>,

        /// TTL 분류 (quote, news, historical, static, user)
        #[arg(short, long, default_value = "news")]
        ttl: String,

        /// 영구 저장소에도 기록
        #[arg(long, default_value = "false")]
        persist: bool,

        /// 쿼리 파라미터 (NAME=VALUE, 반복 가능)
        #[arg(short = 'q', long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
    },

    /// 캐시 통계 출력
    Stats,

    /// 패턴과 일치하는 캐시 키 무효화
    Invalidate {
        /// 정규식 (논리 키 기준, 예: ^quote:)
        #[arg(short, long)]
        pattern: String,
    },

    /// 메모리와 영구 캐시 모두 비우기
    Clear,

    /// 설정 점검
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    init_logging(LogConfig::from(&config.logging))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Fetch {
            provider,
            endpoint,
            key,
            ttl,
            persist,
            params,
        } => {
            let ttl: TtlClass = ttl
                .parse()
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            let params = params
                .iter()
                .map(|p| parse_param(p))
                .collect::<Result<Vec<_>>>()?;

            let args = FetchArgs {
                provider,
                endpoint,
                key,
                ttl,
                persist,
                params,
            };
            commands::fetch::run(&config, args).await?;
        }

        Commands::Stats => {
            commands::cache::stats(&config.cache)?;
        }

        Commands::Invalidate { pattern } => {
            commands::cache::invalidate(&config.cache, &pattern)?;
        }

        Commands::Clear => {
            commands::cache::clear(&config.cache)?;
        }

        Commands::CheckConfig => {
            let warnings = commands::check_config::run(&config);
            if warnings.is_empty() {
                info!("Configuration check passed");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch_command() {
        let cli = Cli::try_parse_from([
            "riser", "fetch", "-p", "news", "-e", "top", "-q", "country=us", "-q", "page=2",
            "--persist",
        ])
        .unwrap();

        match cli.command {
            Commands::Fetch {
                provider,
                params,
                persist,
                ttl,
                ..
            } => {
                assert_eq!(provider, "news");
                assert_eq!(params, vec!["country=us", "page=2"]);
                assert!(persist);
                assert_eq!(ttl, "news");
            }
            _ => panic!("expected fetch"),
        }
        assert_eq!(cli.config, "config/default.toml");
    }

    #[test]
    fn test_clear_help_names_both_tiers() {
        let command = Cli::command();
        let clear = command.find_subcommand("clear").unwrap();
        let about = clear.get_about().unwrap().to_string();
        assert!(about.contains("메모리"));
        assert!(about.contains("영구"));
    }
}
