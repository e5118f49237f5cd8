use std::env;
use std::time::Duration;

use clap::Parser;
use foundation::HierarchyView;
use runtime::EngineTiming;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for the network map query engine")]
pub struct Args {
    /// Query service base URL (default: $CMV_API_URL, then the local dev server)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Page URL to hydrate state from
    #[arg(long, default_value = "http://localhost/")]
    pub location: String,

    /// Map container width in pixels
    #[arg(long, default_value_t = 1280.0)]
    pub width: f64,

    /// Map container height in pixels
    #[arg(long, default_value_t = 800.0)]
    pub height: f64,

    /// Centre on a named asset and show its attributes
    #[arg(long)]
    pub fly_to: Option<String>,

    /// Colour features by this column
    #[arg(long)]
    pub color: Option<String>,

    /// Level of detail ("auto" for server choice)
    #[arg(long)]
    pub detail: Option<String>,

    #[arg(long)]
    pub gxp: Option<String>,

    #[arg(long, requires = "gxp")]
    pub substation: Option<String>,

    #[arg(long, requires = "substation")]
    pub hv: Option<String>,

    #[arg(long, requires = "hv")]
    pub dtx: Option<String>,

    /// Shortest path between two assets
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
    pub path: Option<Vec<String>>,

    /// Edge excluded from the shortest path (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    /// Flood fill from an asset
    #[arg(long)]
    pub flood: Option<String>,

    /// Edge excluded from the flood fill (repeatable)
    #[arg(long = "flood-exclude")]
    pub flood_exclude: Vec<String>,

    /// Name completion input
    #[arg(long)]
    pub search: Option<String>,

    /// How long to let timers and requests settle before reporting
    #[arg(long, default_value_t = 3000)]
    pub settle_ms: u64,

    /// Log filter used when CMV_LOG is unset
    #[arg(long, default_value = "warn")]
    pub log: String,
}

impl Args {
    /// Hierarchy filter given on the command line, if any.
    pub fn hierarchy(&self) -> Option<HierarchyView> {
        HierarchyView::from_parts(
            self.gxp.as_deref(),
            self.substation.as_deref(),
            self.hv.as_deref(),
            self.dtx.as_deref(),
        )
    }

    /// `Some(None)` selects automatic detail.
    pub fn level_of_detail(&self) -> Option<Option<String>> {
        self.detail.as_ref().map(|d| {
            if d.eq_ignore_ascii_case("auto") {
                None
            } else {
                Some(d.clone())
            }
        })
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

pub fn api_url(flag: Option<&str>) -> String {
    flag.map(str::to_string)
        .or_else(|| env_var_string("CMV_API_URL"))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

pub fn timing_from_env() -> EngineTiming {
    timing_from(|key| env::var(key).ok())
}

/// Engine windows with per-variable overrides looked up through `var`.
/// Values that are missing or not whole milliseconds keep their default.
pub fn timing_from(var: impl Fn(&str) -> Option<String>) -> EngineTiming {
    let ms = |key: &str, default: Duration| {
        var(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(default)
    };
    let defaults = EngineTiming::default();
    EngineTiming {
        base_throttle: ms("CMV_THROTTLE_MS", defaults.base_throttle),
        base_debounce: ms("CMV_DEBOUNCE_MS", defaults.base_debounce),
        query_debounce: ms("CMV_QUERY_DEBOUNCE_MS", defaults.query_debounce),
        url_sync_debounce: ms("CMV_URL_SYNC_MS", defaults.url_sync_debounce),
        ..defaults
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
