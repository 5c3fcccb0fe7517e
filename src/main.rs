use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tagwatch::aggregator::{self, Coverage};
use tagwatch::config::DashboardConfig;
use tagwatch::export::{self, ExportKind};
use tagwatch::loader::DataLoader;
use tagwatch::render::{self, PageMode, StatCards};
use tagwatch::state::SessionState;
use tagwatch::timeline::{self, HistoryFilter, WeekComparison, WeekSelection};

#[derive(Parser)]
#[command(name = "tagwatch", version, about = "Azure service-tags change tracker")]
struct Cli {
    /// Data root URL (overrides config and TAGWATCH_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Config file path (default: ~/.tagwatch/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Headline stats, top services, and this week's regional hotspots
    Overview,
    /// Historical activity ranking, infrastructure churn, and update history
    Analytics {
        /// Page of the active-services table
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// The week-by-week change history
    History {
        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Weeks shown per page
        #[arg(long, default_value_t = 5)]
        page_size: usize,

        /// Compare exactly two weeks (by date), e.g. 2025-10-01,2025-10-08
        #[arg(long, value_delimiter = ',', num_args = 2)]
        compare: Option<Vec<NaiveDate>>,
    },
    /// Write change history to a JSON or CSV file
    Export {
        #[command(subcommand)]
        what: ExportCommand,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Case-insensitive text match on service, region, or date
    #[arg(long)]
    search: Option<String>,

    /// Raw region code, e.g. westus2
    #[arg(long)]
    region: Option<String>,

    /// Only weeks within the last N days
    #[arg(long)]
    window_days: Option<u32>,
}

impl FilterArgs {
    fn into_filter(self) -> HistoryFilter {
        HistoryFilter {
            search: self.search,
            region: self.region,
            window_days: self.window_days,
        }
    }
}

#[derive(Subcommand)]
enum ExportCommand {
    /// Export the weeks and records matching the filters
    Filtered {
        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Output path (default: the dashboard's download filename)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export explicitly selected weeks
    Selected {
        /// Week dates to include, e.g. --weeks 2025-10-01,2025-10-08
        #[arg(long, value_delimiter = ',', required = true)]
        weeks: Vec<NaiveDate>,

        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DashboardConfig::load_from(path),
        None => DashboardConfig::load(),
    }
    .with_overrides(cli.base_url.clone(), cli.timeout);
    info!(base_url = %config.base_url, "using data root");

    let loader = DataLoader::new(&config).context("invalid data source configuration")?;

    match cli.command {
        Command::Overview => overview(&loader).await,
        Command::Analytics { page } => analytics(&loader, page).await,
        Command::History {
            filters,
            page,
            page_size,
            compare,
        } => history(&loader, filters.into_filter(), page, page_size, compare).await,
        Command::Export { what } => run_export(&loader, what).await,
    }
}

async fn overview(loader: &DataLoader) -> anyhow::Result<()> {
    let data = loader
        .load_initial()
        .await
        .context("could not load dashboard data")?;

    let stats = StatCards::build(&data.summary, &data.current);
    print!("{}", render::render_overview(&stats, &data.summary));

    let rollup = aggregator::regional_rollup(&data.latest_changes.changes);
    let hotspots = aggregator::hotspots(&rollup);
    let minor = aggregator::minor_regions(&rollup);
    println!();
    print!(
        "{}",
        render::render_hotspots(&hotspots, &minor, &data.latest_changes.changes)
    );
    Ok(())
}

async fn analytics(loader: &DataLoader, page: usize) -> anyhow::Result<()> {
    let ranked = aggregator::historical_activity(loader).await;
    let ranked = if ranked.is_empty() {
        // Nothing historical loaded at all; fall back to the current week.
        match loader.load_change_file("latest-changes.json").await {
            Ok(latest) => aggregator::current_week_activity(&latest),
            Err(_) => ranked,
        }
    } else {
        ranked
    };
    print!("{}", render::render_services_page(&ranked, page));

    if let Ok(manifest) = loader.load_manifest().await {
        let rollup = aggregator::infra_rollup(loader, &manifest).await;
        println!();
        print!("{}", render::render_infra(&rollup));

        let events = aggregator::update_events(loader, &manifest).await;
        println!();
        print!("{}", render::render_update_events(&events));

        let coverage = Coverage::from_manifest(&manifest);
        println!();
        print!("{}", render::render_coverage(&coverage));
    }
    Ok(())
}

async fn history(
    loader: &DataLoader,
    filter: HistoryFilter,
    page: usize,
    page_size: usize,
    compare: Option<Vec<NaiveDate>>,
) -> anyhow::Result<()> {
    let manifest = loader
        .load_manifest()
        .await
        .context("could not load the change manifest")?;
    let items = timeline::build_timeline(loader, &manifest).await;

    let mut state = SessionState::new(PageMode::History);
    state.changes_page = page;
    state.filter = filter;

    if let Some(dates) = compare {
        for date in &dates {
            state.compare.toggle(*date);
        }
        let (earlier, later) = state
            .compare
            .pair()
            .context("comparison needs two distinct weeks")?;
        let week = |d: NaiveDate| {
            items
                .iter()
                .find(|i| i.date == d)
                .with_context(|| format!("no change file for week {d}"))
        };
        let cmp = WeekComparison::between(week(earlier)?, week(later)?);
        print!("{}", render::render_comparison(&cmp));
        return Ok(());
    }

    let today = Utc::now().date_naive();
    let kept = state.filter.apply(&items, today);
    print!(
        "{}",
        render::render_timeline(&kept, &state.filter, state.changes_page, page_size)
    );

    if !state.filter.is_active() {
        if let Some(span_days) = items
            .last()
            .zip(items.first())
            .map(|(oldest, newest)| (newest.date - oldest.date).num_days().max(0) as u32)
        {
            let options = timeline::window_options(span_days);
            if !options.is_empty() {
                let days: Vec<String> = options.iter().map(u32::to_string).collect();
                println!("window options (days): {}", days.join(", "));
            }
        }
    }
    Ok(())
}

async fn run_export(loader: &DataLoader, what: ExportCommand) -> anyhow::Result<()> {
    let manifest = loader
        .load_manifest()
        .await
        .context("could not load the change manifest")?;
    let items = timeline::build_timeline(loader, &manifest).await;
    let today = Utc::now().date_naive();
    let now = Utc::now();

    let (content, path) = match what {
        ExportCommand::Filtered { filters, format, out } => {
            let filter = filters.into_filter();
            let kept = filter.apply(&items, today);
            let (content, kind) = match format {
                Format::Json => (
                    export::export_filtered_json(&kept, &filter, now),
                    ExportKind::FilteredJson,
                ),
                Format::Csv => (
                    export::export_filtered_csv(&kept, &filter),
                    ExportKind::FilteredCsv,
                ),
            };
            let path =
                out.unwrap_or_else(|| export::export_filename(kind, &filter, today).into());
            (content, path)
        }
        ExportCommand::Selected { weeks, format, out } => {
            let mut selection = WeekSelection::default();
            for week in weeks {
                selection.insert(week);
            }
            let refs: Vec<&_> = items.iter().collect();
            let (content, kind) = match format {
                Format::Json => (
                    export::export_selected_json(&refs, &selection, now),
                    ExportKind::SelectedJson,
                ),
                Format::Csv => (
                    export::export_selected_csv(&refs, &selection),
                    ExportKind::SelectedCsv,
                ),
            };
            let filter = HistoryFilter::default();
            let path =
                out.unwrap_or_else(|| export::export_filename(kind, &filter, today).into());
            (content, path)
        }
    };

    let content = content?;
    std::fs::write(&path, content).with_context(|| format!("could not write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
