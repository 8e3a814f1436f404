//! Prompt rendering for every model call in the pipeline.
//!
//! Pure functions from structured inputs to prompt text. Stages never build
//! prompt strings themselves; keeping the templates here means a wording
//! change cannot silently break a parser elsewhere.

use distiller_shared::{Category, Record, SubCategory};

/// Render records for embedding in a prompt, separated by blank lines.
fn join_records(records: &[Record]) -> String {
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Category list rendered as pretty JSON for classification prompts.
fn categories_json(categories: &[Category]) -> String {
    serde_json::to_string_pretty(categories).unwrap_or_else(|_| "[]".into())
}

/// Taxonomy discovery over a sample of records.
pub fn category_discovery(domain: &str, sample: &[Record]) -> String {
    format!(
        r#"You are analyzing ticket data from a {domain} system. Your task is to discover knowledge categories based STRICTLY on the provided sample tickets.

# Sample Tickets
{records}

# Task
Create a taxonomy of knowledge categories based ONLY on these sample tickets.

For each category:
1. Provide a clear, concise name to capture the essence of the issue type (5 words or less).
2. Write a brief description of what this category encompasses (50 words or less).
3. List identifying patterns or keywords (maximum 15 per category).

# Important Guidelines
1. Focus ONLY on categories that are ACTUALLY REPRESENTED in the sample tickets.
2. Categories should be based on the nature of the problem, not just surface details.
3. Categories should be distinct from each other with minimal overlap.
4. The number of categories should reflect the diversity in the sample. DO NOT create more categories than justified by the samples.
5. Be extremely concise with category names and descriptions, and use short keywords for identifying patterns.
6. DO NOT use your general knowledge about {domain} systems to invent categories, rely ONLY on what's in the data.

# Output Format
Return a JSON structure:

{{
  "categories": [
    {{
      "name": "Short Category Name",
      "description": "Brief description",
      "identifying_patterns": ["pattern1", "pattern2", "pattern3"]
    }}
  ]
}}
Ensure your JSON is properly formatted and valid."#,
        records = join_records(sample),
    )
}

/// Classification of one record against the discovered categories.
pub fn record_categorization(domain: &str, record: &Record, categories: &[Category]) -> String {
    format!(
        r#"You are categorizing a {domain} ticket into predefined knowledge categories.

# Ticket Information
Title: {title}
Description: {description}

# Available Categories
{categories}

# Task
Assign this ticket to the most appropriate category from the list.
If the ticket clearly fits multiple categories, you may assign it to up to 2 categories.

# Output Format
Return a JSON structure:

{{
  "assignments": [
    {{
      "category": "Category Name",
      "reasoning": "Brief explanation of why this category fits"
    }}
  ]
}}

If no categories are clearly applicable, return an empty assignments array."#,
        title = record.title,
        description = record.description,
        categories = categories_json(categories),
    )
}

/// Knowledge article synthesis from one category's bucket.
pub fn knowledge_synthesis(
    category_name: &str,
    category_description: &str,
    records: &[Record],
) -> String {
    format!(
        r#"You are synthesizing knowledge from tickets to create a concise, factual knowledge base article specifically for users who create tickets in this system.

# Category Information
Name: {category_name}
Description: {category_description}

# Tickets in this Category
{records}

# Task
Create a CONCISE knowledge article that contains ONLY information directly supported by the ticket data.

# Important Requirements
1. Use ONLY information explicitly mentioned in the ticket data.
2. DO NOT expand acronyms unless they are expanded in the tickets themselves.
3. DO NOT invent processes or best practices not mentioned in tickets.
4. Keep the article SHORT and FOCUSED.
5. Write in a direct style addressing ticket creators.

# Output Format
Your response should be a concise markdown document with:

1. Title: A brief descriptive title for the category "{category_name}".
2. Common Issues: 2-3 bullet points of the main issues (be brief).
3. Tips for Resolution: Specific advice based ONLY on what worked in the tickets.
4. Resources: Only mention systems/links that appear in the tickets, if any.

Total length should be no more than 400-500 words maximum.
Your entire response must be a single markdown document. Do not wrap it in JSON or other structures."#,
        records = records
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n\n---\n\n"),
    )
}

/// Sub-taxonomy discovery scoped to one over-threshold category.
pub fn subcategory_discovery(
    parent: &Category,
    sample: &[Record],
) -> String {
    format!(
        r#"You are refining one knowledge category into sub-categories based STRICTLY on the tickets assigned to it.

# Parent Category
Name: {name}
Description: {description}

# Tickets in this Category
{records}

# Task
Create a taxonomy of sub-categories that split this category into more specific issue types.

For each sub-category:
1. Provide a clear, concise name (5 words or less).
2. Write a brief description (50 words or less).
3. List identifying patterns or keywords (maximum 15 per sub-category).
4. Set "parent_category" to "{name}".

# Important Guidelines
1. Only create sub-categories that are ACTUALLY REPRESENTED in these tickets.
2. If the tickets do not meaningfully split, return an empty list.
3. Sub-categories should be distinct from each other with minimal overlap.

# Output Format
Return a JSON structure:

{{
  "subcategories": [
    {{
      "name": "Short Sub-Category Name",
      "description": "Brief description",
      "identifying_patterns": ["pattern1", "pattern2"],
      "parent_category": "{name}"
    }}
  ]
}}
Ensure your JSON is properly formatted and valid."#,
        name = parent.name,
        description = parent.description,
        records = join_records(sample),
    )
}

/// Classification of one record against a parent category's sub-categories.
pub fn subcategory_categorization(
    parent: &Category,
    record: &Record,
    subcategories: &[SubCategory],
) -> String {
    format!(
        r#"You are categorizing a ticket already assigned to the "{parent_name}" category into one of its sub-categories.

# Ticket Information
Title: {title}
Description: {description}

# Available Sub-Categories
{subcategories}

# Task
Assign this ticket to the most appropriate sub-category from the list.
If the ticket clearly fits multiple sub-categories, you may assign it to up to 2.

# Output Format
Return a JSON structure:

{{
  "assignments": [
    {{
      "subcategory": "Sub-Category Name",
      "reasoning": "Brief explanation of why this sub-category fits"
    }}
  ]
}}

If no sub-categories are clearly applicable, return an empty assignments array."#,
        parent_name = parent.name,
        title = record.title,
        description = record.description,
        subcategories = serde_json::to_string_pretty(subcategories).unwrap_or_else(|_| "[]".into()),
    )
}

/// Meta-prompt that rewrites a stage prompt for a named domain.
pub fn prompt_optimization(prompt: &str, domain: &str) -> String {
    format!(
        r#"You are a prompt engineering expert. Your task is to refine the following prompt to be more effective for the specific domain of "{domain}".

# Original Prompt
{prompt}

# Task
Rewrite the prompt to be more specific, clear, and effective for the "{domain}" domain. Maintain the original JSON output format if one was requested. The revised prompt should guide the AI to produce more accurate and relevant results for this domain. Do not wrap the output in markdown or any other formatting. Just return the raw, optimized prompt."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, description: &str) -> Record {
        Record {
            title: title.into(),
            description: description.into(),
        }
    }

    fn category(name: &str) -> Category {
        Category {
            name: name.into(),
            description: format!("{name} issues"),
            identifying_patterns: vec!["pattern".into()],
        }
    }

    #[test]
    fn discovery_prompt_embeds_sample_and_domain() {
        let sample = vec![
            record("Cannot access drive", "access denied on Q3-Financials"),
            record("Login issue", "terminal says invalid credentials"),
        ];
        let prompt = category_discovery("supply chain management", &sample);
        assert!(prompt.contains("supply chain management"));
        assert!(prompt.contains("Cannot access drive"));
        assert!(prompt.contains("invalid credentials"));
        assert!(prompt.contains(r#""categories""#));
    }

    #[test]
    fn categorization_prompt_embeds_record_fields_and_category_json() {
        let rec = record("Password expired", "reset link broken");
        let cats = vec![category("Access Denied"), category("Login Failure")];
        let prompt = record_categorization("IT helpdesk", &rec, &cats);
        assert!(prompt.contains("Title: Password expired"));
        assert!(prompt.contains("Description: reset link broken"));
        assert!(prompt.contains(r#""name": "Access Denied""#));
        assert!(prompt.contains("empty assignments array"));
    }

    #[test]
    fn synthesis_prompt_separates_records() {
        let records = vec![record("a", "first"), record("b", "second")];
        let prompt = knowledge_synthesis("Access Denied", "Permission problems", &records);
        assert!(prompt.contains("Access Denied"));
        assert!(prompt.contains("\n\n---\n\n"));
        assert!(prompt.contains("single markdown document"));
    }

    #[test]
    fn subcategory_discovery_pins_parent_name() {
        let parent = category("Access Denied");
        let prompt = subcategory_discovery(&parent, &[record("t", "d")]);
        assert!(prompt.contains(r#""parent_category": "Access Denied""#));
        assert!(prompt.contains(r#""subcategories""#));
    }

    #[test]
    fn subcategory_categorization_uses_subcategory_field() {
        let parent = category("Access Denied");
        let subs = vec![SubCategory {
            name: "Shared Drive".into(),
            description: "drive permissions".into(),
            identifying_patterns: vec![],
            parent_category: parent.name.clone(),
        }];
        let prompt = subcategory_categorization(&parent, &record("t", "d"), &subs);
        assert!(prompt.contains(r#""subcategory""#));
        assert!(prompt.contains("Shared Drive"));
    }

    #[test]
    fn optimization_prompt_quotes_domain_and_original() {
        let prompt = prompt_optimization("Classify this ticket.", "logistics");
        assert!(prompt.contains(r#""logistics""#));
        assert!(prompt.contains("Classify this ticket."));
    }
}
