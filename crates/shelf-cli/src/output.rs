//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::io::IsTerminal;

use serde::Serialize;
use shelf_core::{Item, ItemFields};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// JSON shape of an item: derived id plus every stored field
#[derive(Serialize)]
struct ItemView<'a> {
    id: &'a str,
    #[serde(flatten)]
    fields: ItemFields,
}

impl<'a> ItemView<'a> {
    fn of(item: &'a Item) -> Self {
        Self {
            id: item.id(),
            fields: item.fields(),
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single item
    pub fn print_item(&self, item: &Item) {
        match self.format {
            OutputFormat::Human => {
                let fields = item.fields();
                println!("ID:        {}", item.id());
                println!("URL:       {}", item.url());
                println!("Title:     {}", fields.title.as_deref().unwrap_or("(untitled)"));
                if let Some(domain) = item.domain() {
                    println!("Domain:    {}", domain);
                }
                if let Some(ref excerpt) = fields.excerpt {
                    println!("Excerpt:   {}", truncate_line(excerpt, 70));
                }
                if let Some(ref guid) = fields.guid {
                    println!("Guid:      {}", guid);
                }
                println!("Status:    {:?}", fields.status);
                println!("Unread:    {}", yes_no(fields.unread));
                println!("Favorite:  {}", yes_no(fields.favorite));
                if let Some(added_on) = fields.added_on {
                    println!("Added:     {}", added_on.format("%Y-%m-%d %H:%M"));
                }
                if let Some(read_on) = fields.marked_read_on {
                    match fields.marked_read_by {
                        Some(ref by) => {
                            println!("Read:      {} by {}", read_on.format("%Y-%m-%d %H:%M"), by)
                        }
                        None => println!("Read:      {}", read_on.format("%Y-%m-%d %H:%M")),
                    }
                }
            }
            OutputFormat::Json => print_json(&ItemView::of(item)),
            OutputFormat::Quiet => {
                println!("{}", item.url());
            }
        }
    }

    /// Print a page of items, with the total number of matches
    pub fn print_items(&self, items: &[Item], total: usize) {
        match self.format {
            OutputFormat::Human => {
                if items.is_empty() {
                    println!("No items found.");
                    return;
                }
                for item in items {
                    let fields = item.fields();
                    let marker = match (fields.unread, fields.favorite) {
                        (_, true) => '*',
                        (true, false) => '+',
                        (false, false) => ' ',
                    };
                    println!(
                        "{} {} | {} | {}",
                        marker,
                        &item.id()[..8],
                        truncate(fields.title.as_deref().unwrap_or("(untitled)"), 35),
                        truncate(item.url(), 45)
                    );
                }
                if items.len() < total {
                    println!("\n{} of {} item(s)", items.len(), total);
                } else {
                    println!("\n{} item(s)", items.len());
                }
            }
            OutputFormat::Json => {
                let views: Vec<_> = items.iter().map(ItemView::of).collect();
                print_json(&serde_json::json!({ "total": total, "items": views }));
            }
            OutputFormat::Quiet => {
                for item in items {
                    println!("{}", item.url());
                }
            }
        }
    }

    /// Print a bare count
    pub fn print_count(&self, count: usize) {
        match self.format {
            OutputFormat::Human => println!("{} item(s)", count),
            OutputFormat::Json => print_json(&serde_json::json!({ "count": count })),
            OutputFormat::Quiet => println!("{}", count),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human && std::io::stdin().is_terminal()
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON output: {}", e),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
