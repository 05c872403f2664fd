//! Item command handlers

use anyhow::{anyhow, bail, Context, Result};

use shelf_core::{Field, Item, ItemFields, ItemPatch, QueryOptions, ReadingList};

use crate::output::Output;

/// Filters accepted by `shelf list`
#[derive(Debug, Default)]
pub struct ListFilter {
    pub unread: bool,
    pub favorite: bool,
    pub where_json: Option<String>,
    pub sort: Option<String>,
    pub descending: bool,
    pub limit: Option<usize>,
    pub all: bool,
}

/// Add a new item
pub async fn add(
    list: &ReadingList,
    url: String,
    title: Option<String>,
    excerpt: Option<String>,
    favorite: bool,
    output: &Output,
) -> Result<()> {
    let mut fields = ItemFields::new(url);
    fields.title = title;
    fields.excerpt = excerpt;
    fields.favorite = favorite;

    let item = list.add_item(fields).await.context("Failed to add item")?;

    output.success(&format!("Added: {}", item.url()));
    output.print_item(&item);
    Ok(())
}

/// List items, one page at a time unless `--all` is given
pub async fn list(
    list: &ReadingList,
    filter: ListFilter,
    page_size: usize,
    output: &Output,
) -> Result<()> {
    let specs = build_specs(&filter)?;
    let total = list.count(&specs).await?;

    let count = if filter.all {
        None
    } else {
        Some(filter.limit.unwrap_or(page_size))
    };

    let mut cursor = list.iterator(&specs)?;
    let items = cursor.items(count).await?;

    output.print_items(&items, total);
    Ok(())
}

/// Show a single item
pub async fn show(list: &ReadingList, url: String, output: &Output) -> Result<()> {
    let item = find(list, &url).await?;
    output.print_item(&item);
    Ok(())
}

/// Change an item's title, excerpt or favorite flag
pub async fn edit(
    list: &ReadingList,
    url: String,
    title: Option<String>,
    excerpt: Option<String>,
    favorite: Option<bool>,
    output: &Output,
) -> Result<()> {
    let mut patch = ItemPatch::new();
    if let Some(title) = title {
        patch = patch.title(title);
    }
    if let Some(excerpt) = excerpt {
        patch = patch.excerpt(excerpt);
    }
    if let Some(favorite) = favorite {
        patch = patch.favorite(favorite);
    }
    if patch.is_empty() {
        bail!("Nothing to change. Pass --title, --excerpt or --favorite.");
    }

    let item = find(list, &url).await?;
    item.apply(patch).await.context("Failed to update item")?;

    output.success("Item updated");
    output.print_item(&item);
    Ok(())
}

/// Mark an item as read
pub async fn read(
    list: &ReadingList,
    url: String,
    by: Option<String>,
    output: &Output,
) -> Result<()> {
    let item = find(list, &url).await?;
    if !item.unread() {
        output.success(&format!("Already read: {}", item.url()));
        return Ok(());
    }

    item.mark_read(by).await.context("Failed to mark item read")?;
    output.success(&format!("Marked read: {}", item.url()));
    Ok(())
}

/// Delete an item
pub async fn delete(list: &ReadingList, url: String, force: bool, output: &Output) -> Result<()> {
    let item = find(list, &url).await?;

    // Confirm deletion
    if !force && output.should_prompt() {
        println!(
            "Delete item: {} - {}",
            item.url(),
            item.title().as_deref().unwrap_or("(untitled)")
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    list.delete_item(&item)
        .await
        .context("Failed to delete item")?;

    output.success(&format!("Deleted: {}", item.url()));
    Ok(())
}

/// Count matching items
pub async fn count(list: &ReadingList, where_json: Option<String>, output: &Output) -> Result<()> {
    let specs = match where_json {
        Some(json) => parse_where(&json)?,
        None => Vec::new(),
    };
    output.print_count(list.count(&specs).await?);
    Ok(())
}

async fn find(list: &ReadingList, url: &str) -> Result<Item> {
    list.item_for_url(url)
        .await?
        .ok_or_else(|| anyhow!("Item not found: {}", url))
}

fn parse_where(json: &str) -> Result<Vec<QueryOptions>> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("--where must be valid JSON")?;
    Ok(QueryOptions::list_from_json(&value)?)
}

/// Combine `--where` with the flag filters, which apply to every object
fn build_specs(filter: &ListFilter) -> Result<Vec<QueryOptions>> {
    let mut specs = match &filter.where_json {
        Some(json) => parse_where(json)?,
        None => Vec::new(),
    };

    if filter.unread || filter.favorite || filter.sort.is_some() || filter.descending {
        if specs.is_empty() {
            specs.push(QueryOptions::new());
        }
        for options in specs.iter_mut() {
            if filter.unread {
                *options = std::mem::take(options).eq(Field::Unread, true);
            }
            if filter.favorite {
                *options = std::mem::take(options).eq(Field::Favorite, true);
            }
        }
    }

    if let Some(last) = specs.last_mut() {
        if let Some(sort) = &filter.sort {
            last.sort = Some(sort.parse::<Field>().map_err(|e| anyhow!(e))?);
        }
        if filter.descending {
            last.descending = true;
        }
    }

    Ok(specs)
}

/// Prompt for confirmation
fn confirm(prompt: &str) -> Result<bool> {
    use std::io::{self, Write};

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::FieldValue;

    fn condition_value(options: &QueryOptions, field: Field) -> Option<FieldValue> {
        options.conditions().find_map(|(f, cond)| match cond {
            shelf_core::Condition::Eq(value) if f == field => Some(value.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_no_filters_matches_everything() {
        let specs = build_specs(&ListFilter::default()).unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_flags_apply_to_every_object() {
        let filter = ListFilter {
            unread: true,
            where_json: Some(r#"[{"status": 1}, {"favorite": true}]"#.to_string()),
            ..Default::default()
        };
        let specs = build_specs(&filter).unwrap();

        assert_eq!(specs.len(), 2);
        for options in &specs {
            assert_eq!(
                condition_value(options, Field::Unread),
                Some(FieldValue::Bool(true))
            );
        }
    }

    #[test]
    fn test_sort_goes_on_last_object() {
        let filter = ListFilter {
            where_json: Some(r#"[{"unread": true}, {"favorite": true}]"#.to_string()),
            sort: Some("added_on".to_string()),
            descending: true,
            ..Default::default()
        };
        let specs = build_specs(&filter).unwrap();

        assert_eq!(specs[0].sort, None);
        assert_eq!(specs[1].sort, Some(Field::AddedOn));
        assert!(specs[1].descending);
    }

    #[test]
    fn test_bad_input_is_rejected() {
        let filter = ListFilter {
            sort: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(build_specs(&filter).is_err());

        assert!(parse_where("not json").is_err());
        assert!(parse_where(r#"{"color": "red"}"#).is_err());
    }

    #[tokio::test]
    async fn test_edit_requires_a_change() {
        use crate::output::OutputFormat;
        use shelf_core::MemoryStore;

        let list = ReadingList::new(MemoryStore::new());
        list.add_item(ItemFields::new("https://a")).await.unwrap();
        let output = Output::new(OutputFormat::Quiet);

        let result = edit(&list, "https://a".into(), None, None, None, &output).await;
        assert!(result.is_err());

        edit(&list, "https://a".into(), Some("A".into()), None, Some(true), &output)
            .await
            .unwrap();
        let item = list.item_for_url("https://a").await.unwrap().unwrap();
        assert_eq!(item.title().as_deref(), Some("A"));
        assert!(item.favorite());
    }

    #[tokio::test]
    async fn test_read_and_delete() {
        use crate::output::OutputFormat;
        use shelf_core::MemoryStore;

        let list = ReadingList::new(MemoryStore::new());
        list.add_item(ItemFields::new("https://a")).await.unwrap();
        let output = Output::new(OutputFormat::Quiet);

        read(&list, "https://a".into(), Some("cli".into()), &output)
            .await
            .unwrap();
        let item = list.item_for_url("https://a").await.unwrap().unwrap();
        assert!(!item.unread());

        delete(&list, "https://a".into(), true, &output).await.unwrap();
        assert!(!item.is_attached());
        assert!(show(&list, "https://a".into(), &output).await.is_err());
    }
}
