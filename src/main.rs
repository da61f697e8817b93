use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::Notify;

use sentibot::arguments::Arguments;
use sentibot::collector::HttpCollector;
use sentibot::config::BotConfig;
use sentibot::engine::Engine;
use sentibot::logger::{self, LogTag};
use sentibot::market::binance::BinanceMarketData;
use sentibot::market::paper::PaperBroker;
use sentibot::sentiment::{HttpOracle, SentimentAnalyzer, SentimentOracle};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Arguments::parse();
    if args.debug {
        logger::enable_debug();
    }

    let mut cfg = match BotConfig::load(&args.config) {
        Ok(cfg) => {
            logger::info(LogTag::Config, &format!("Loaded {}", args.config));
            cfg
        }
        Err(e) => {
            logger::warning(
                LogTag::Config,
                &format!("Could not load {} ({}), using defaults", args.config, e),
            );
            BotConfig::default()
        }
    };
    if let Some(interval) = args.interval {
        cfg.cycle_interval_secs = interval;
    }
    cfg.validate().map_err(|e| {
        logger::error(LogTag::Config, &format!("Invalid configuration: {}", e));
        e
    })?;

    logger::info(
        LogTag::Config,
        &format!(
            "Cycle {}s | SL band [{:.1}%, {:.1}%] | trailing {} ({:.1}%) | fallback oracle {}",
            cfg.cycle_interval_secs,
            cfg.strategy.stop_loss_min_pct * 100.0,
            cfg.strategy.stop_loss_max_pct * 100.0,
            if cfg.trading.use_trailing_stop { "on" } else { "off" },
            cfg.trading.trailing_stop_distance * 100.0,
            if cfg.sentiment.use_fallback_oracle { "enabled" } else { "disabled" }
        ),
    );

    // Startup diagnostics: probe the primary oracle once so a dead LLM server
    // is visible immediately rather than on the first shortlist.
    let probe = HttpOracle::new(
        "primary",
        cfg.sentiment.primary_url.clone(),
        cfg.sentiment.primary_model.clone(),
        cfg.sentiment.primary_api_key.clone(),
        cfg.sentiment.request_timeout_secs,
        cfg.sentiment.liveness_timeout_secs,
    );
    if probe.is_live().await {
        logger::success(LogTag::Sentiment, "Primary oracle is live");
    } else if cfg.sentiment.use_fallback_oracle {
        logger::warning(
            LogTag::Sentiment,
            "Primary oracle is not responding; fallback oracle will be used",
        );
    } else {
        logger::warning(
            LogTag::Sentiment,
            "Primary oracle is not responding and fallback is disabled; \
             candidates will rank on technicals only",
        );
    }

    let cfg = Arc::new(cfg);
    let data = Arc::new(BinanceMarketData::new(&cfg.market));
    let broker = Arc::new(PaperBroker::new(
        data,
        cfg.market.quote_asset.clone(),
        cfg.market.fee_percent,
        args.balance,
    ));
    let collector = Arc::new(HttpCollector::new(cfg.collector.clone()));
    let analyzer = Arc::new(SentimentAnalyzer::from_config(&cfg.sentiment));

    let mut engine = Engine::new(cfg.clone(), broker.clone(), broker, collector, analyzer);

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            // notify_one stores a permit, so a ctrl-c during a cycle still
            // stops the loop at the next wait
            shutdown.notify_one();
        })?;
    }

    engine.run_loop(shutdown).await;

    let snapshot = engine.snapshot();
    logger::info(
        LogTag::Engine,
        &format!(
            "Final state: {} | {} trades today, {:+.2} realized",
            match &snapshot.position {
                Some(p) => format!("position open in {}", p.symbol),
                None => "no open position".to_string(),
            },
            snapshot.risk.trades_count,
            snapshot.risk.cumulative_pnl
        ),
    );

    Ok(())
}
