use std::{collections::HashSet, sync::Arc};

use common::utils::llm::Completions;
use tracing::{debug, instrument, warn};

use crate::vocab::{EntitySet, SYNONYMS};

/// Synonyms substituted per matched vocabulary term.
const SYNONYMS_PER_TERM: usize = 2;

/// A question expanded into everything the retriever will search with.
/// Built once per incoming question and immutable afterwards.
#[derive(Debug, Clone)]
pub struct EnhancedQuery {
    pub original: String,
    pub variations: Vec<String>,
    pub sub_questions: Vec<String>,
    pub entities: EntitySet,
    pub hypothetical_passage: String,
}

impl EnhancedQuery {
    /// Ordered, case-insensitively deduplicated union of everything worth
    /// retrieving with: original question, variations, sub-questions, then
    /// the hypothetical passage.
    pub fn search_queries(&self) -> Vec<String> {
        let mut queries = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let candidates = self
            .variations
            .iter()
            .chain(self.sub_questions.iter())
            .chain(std::iter::once(&self.hypothetical_passage));

        for candidate in candidates {
            let key = candidate.to_lowercase();
            if !candidate.trim().is_empty() && seen.insert(key) {
                queries.push(candidate.clone());
            }
        }

        queries
    }
}

/// Expands a question with synonym substitution, generative rephrasing,
/// decomposition of multi-clause questions, and a hypothetical answer
/// passage (HyDE). Completion failures degrade to the plain question.
pub struct QueryEnhancer {
    completions: Arc<dyn Completions>,
    max_variations: usize,
}

impl QueryEnhancer {
    pub fn new(completions: Arc<dyn Completions>, max_variations: usize) -> Self {
        Self {
            completions,
            max_variations: max_variations.max(1),
        }
    }

    #[instrument(skip_all, fields(question_chars = question.chars().count()))]
    pub async fn enhance(&self, question: &str) -> EnhancedQuery {
        let entities = EntitySet::extract(question);

        let mut variations = self.expand_synonyms(question);
        for variation in self.expand_with_completions(question).await {
            variations.push(variation);
        }
        let variations = dedupe_case_insensitive(variations);

        let sub_questions = if needs_decomposition(question) {
            self.decompose(question).await
        } else {
            Vec::new()
        };

        let hypothetical_passage = self.hypothetical_passage(question).await;

        debug!(
            variations = variations.len(),
            sub_questions = sub_questions.len(),
            entities = entities.total(),
            "Query enhanced"
        );

        EnhancedQuery {
            original: question.to_owned(),
            variations,
            sub_questions,
            entities,
            hypothetical_passage,
        }
    }

    /// Substitutes known synonyms into the lowercased question, up to two per
    /// matched term, capped at `max_variations`. The original question is
    /// always first and never evicted by the cap.
    fn expand_synonyms(&self, question: &str) -> Vec<String> {
        let question_lower = question.to_lowercase();
        let mut expanded = vec![question.to_owned()];

        'outer: for (term, synonyms) in SYNONYMS {
            if !question_lower.contains(term) {
                continue;
            }
            for synonym in synonyms.iter().take(SYNONYMS_PER_TERM) {
                let substituted = question_lower.replace(term, synonym);
                if substituted != question_lower {
                    expanded.push(substituted);
                }
                if expanded.len() >= self.max_variations {
                    break 'outer;
                }
            }
        }

        dedupe_case_insensitive(expanded)
    }

    /// Asks the completion service for alternative phrasings. A single
    /// attempt; on failure only the original question survives.
    async fn expand_with_completions(&self, question: &str) -> Vec<String> {
        let requested = self.max_variations.saturating_sub(1);
        if requested == 0 {
            return Vec::new();
        }

        match self
            .completions
            .complete(&expansion_prompt(question, requested))
            .await
        {
            Ok(response) => {
                let mut variations =
                    parse_listed_lines(&response, &["original", "query:", "variations"]);
                variations.truncate(requested);
                variations
            }
            Err(err) => {
                warn!(error = %err, "Query expansion failed; keeping original question");
                Vec::new()
            }
        }
    }

    /// Splits a multi-clause question into sub-questions. Only called when
    /// the question carries multi-clause indicators.
    async fn decompose(&self, question: &str) -> Vec<String> {
        match self
            .completions
            .complete(&decomposition_prompt(question))
            .await
        {
            Ok(response) => parse_listed_lines(&response, &["query:", "sub-questions"]),
            Err(err) => {
                warn!(error = %err, "Query decomposition failed; skipping sub-questions");
                Vec::new()
            }
        }
    }

    /// HyDE: writes a short passage that would answer the question, used only
    /// as an additional retrieval query. Falls back to the question itself.
    async fn hypothetical_passage(&self, question: &str) -> String {
        match self.completions.complete(&hyde_prompt(question)).await {
            Ok(passage) if !passage.trim().is_empty() => passage.trim().to_owned(),
            Ok(_) => question.to_owned(),
            Err(err) => {
                warn!(error = %err, "Hypothetical passage generation failed; reusing question");
                question.to_owned()
            }
        }
    }
}

fn needs_decomposition(question: &str) -> bool {
    let question_lower = question.to_lowercase();
    question_lower.contains(" and ") || question_lower.contains("compare")
}

fn dedupe_case_insensitive(values: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.to_lowercase()))
        .collect()
}

/// Parses a one-item-per-line completion response: drops boilerplate lines,
/// strips leading enumeration such as `1.` or `2)`.
fn parse_listed_lines(response: &str, skip_prefixes: &[&str]) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let line_lower = line.to_lowercase();
            !skip_prefixes
                .iter()
                .any(|prefix| line_lower.starts_with(prefix))
        })
        .map(strip_enumeration)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

fn strip_enumeration(line: &str) -> &str {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return line;
    }
    let rest = &line[digits..];
    if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
        rest.trim_start()
    } else {
        line
    }
}

fn expansion_prompt(question: &str, variations: usize) -> String {
    format!(
        "Given this query about agricultural or climate data, generate {variations} alternative \
         phrasings that maintain the same meaning but use different words and perspectives.\n\n\
         Original Query: {question}\n\n\
         Generate variations that:\n\
         1. Use synonyms and related terms\n\
         2. Rephrase in different structures\n\
         3. Add implicit context when relevant\n\n\
         Variations (one per line):"
    )
}

fn decomposition_prompt(question: &str) -> String {
    format!(
        "Break down this complex query into simpler sub-questions that need to be answered.\n\n\
         Query: {question}\n\n\
         Sub-questions (one per line, numbered):"
    )
}

fn hyde_prompt(question: &str) -> String {
    format!(
        "You are a data analyst. Write a hypothetical passage from a dataset that would \
         perfectly answer this query about agricultural or climate data.\n\n\
         Query: {question}\n\n\
         Write a detailed, data-rich passage (2-3 sentences) that contains specific numbers, \
         locations, and facts that would answer this query:"
    )
}
