use crate::config::Config;
use crate::packages::JsonPackages;
use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;
use sprig_common::{FsLoader, MemoryHistory};
use sprig_compiler::{create_compiler, DirectiveRegistry, FilterRegistry, Services, View, ViewOptions};
use sprig_reactive::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Template URL, relative to the template directory
    pub template: String,

    /// JSON file with the view's data
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Location the router starts at (overrides config)
    #[arg(short, long)]
    pub location: Option<String>,

    /// Debounce for `:model` and `:lazy`, in milliseconds (overrides config)
    #[arg(long)]
    pub debounce: Option<f64>,

    /// Advance the virtual clock after loading, in milliseconds
    #[arg(long, default_value = "0")]
    pub settle: f64,

    /// Print a JSON snapshot of the DOM instead of markup
    #[arg(long)]
    pub json: bool,
}

pub fn render(args: RenderArgs, config: &Config, cwd: &Path) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(render_view(&args, config, cwd))?;
    println!("{}", output);
    Ok(())
}

async fn render_view(args: &RenderArgs, config: &Config, cwd: &Path) -> Result<String> {
    let data = match &args.data {
        Some(path) => {
            let path = cwd.join(path);
            let text = fs::read_to_string(&path).with_context(|| format!("Cannot read {}", path.display()))?;
            let json: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))?;
            Value::from_json(&json)
        }
        None => Value::from(serde_json::json!({})),
    };

    let template_dir = config.template_dir(cwd);
    let location = args.location.clone().unwrap_or_else(|| config.location.clone());
    let loader = Rc::new(FsLoader::new(&template_dir));
    let services = Services::memory()
        .with_loader(loader.clone())
        .with_packages(Rc::new(JsonPackages::new(loader)))
        .with_navigator(Rc::new(MemoryHistory::new(location)));

    let compiler = create_compiler(DirectiveRegistry::new(), FilterRegistry::new());
    let view = View::new(compiler, services, ViewOptions::url(&args.template).with_data(data));
    view.context()
        .set_debounce_ms(args.debounce.unwrap_or(config.debounce));

    info!(template = %args.template, dir = %template_dir.display(), "rendering");
    if let Err(err) = view.load().await {
        eprintln!("{} {}", "Render failed:".red().bold(), err);
        return Err(err.into());
    }
    if args.settle > 0.0 {
        view.advance(args.settle);
        view.settle().await?;
    }

    match view.root() {
        Some(root) if args.json => Ok(serde_json::to_string_pretty(&view.document().snapshot(root))?),
        _ => Ok(view.html()),
    }
}
