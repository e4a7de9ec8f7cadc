use crate::config::{Config, DEFAULT_CONFIG_NAME};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::Path;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Template directory
    #[arg(short, long, default_value = "templates")]
    pub template_dir: String,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

const EXAMPLE_TEMPLATE: &str = r#"<section>
    <h1>{{ title }}</h1>
    <ul>
        <li :for="item of items" .done="item.done">{{ item.label }}</li>
    </ul>
    <input :model="draft" placeholder="New item">
    <button @click="items.push({ label: draft, done: false }); draft = ''">Add</button>
</section>
"#;

const EXAMPLE_DATA: &str = r#"{
    "title": "Todo",
    "draft": "",
    "items": [{ "label": "Write a template", "done": true }]
}
"#;

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = cwd.join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    println!("{}", "📝 Initializing Sprig project...".bright_blue().bold());

    let template_dir = cwd.join(&args.template_dir);
    if !template_dir.exists() {
        fs::create_dir_all(&template_dir)?;
        println!("  {} Created {}/", "✓".green(), args.template_dir);
    }

    let example = template_dir.join("index.html");
    if !example.exists() {
        fs::write(&example, EXAMPLE_TEMPLATE)?;
        fs::write(cwd.join("index.json"), EXAMPLE_DATA)?;
        println!("  {} Created index.html and index.json", "✓".green());
    }

    let config = Config {
        template_dir: args.template_dir.clone(),
        ..Config::default()
    };
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    println!();
    println!("{}", "✅ Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Edit {}/index.html", args.template_dir);
    println!("  2. Run: sprig check");
    println!("  3. Run: sprig render /index.html --data index.json");

    Ok(())
}
