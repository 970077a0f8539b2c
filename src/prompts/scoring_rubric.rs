//! Scoring rubric prompt for cooperative-guidance DRL papers.
//!
//! Placeholders: `{title}`, `{authors}`, `{published}`, `{abstract}`.

use crate::record::PaperRecord;

/// Default scoring prompt
pub const SCORING_PROMPT: &str = r#"You are analyzing a research paper about Deep Reinforcement Learning (DRL) for cooperative missile guidance systems.

Paper Information:
Title: {title}
Authors: {authors}
Published: {published}
Abstract: {abstract}

Analyze this paper and provide scores on the following dimensions:

1. RELEVANCE (0-10): How directly related is this to DRL-based cooperative missile guidance?
   - 10: Directly about DRL for cooperative missile/UAV guidance
   - 7-9: About multi-agent RL for aerial vehicles or guidance systems
   - 4-6: About RL for control/guidance but not cooperative or not aerial
   - 1-3: Tangentially related (general RL, general guidance theory)
   - 0: Not related

2. TECHNOLOGY MATURITY (1-5): What development stage does this represent?
   - 1 = THEORY: Pure algorithms, mathematical proofs, simulation only
   - 2 = LAB DEMO: Component tests, simple scenarios, proof-of-concept
   - 3 = INTEGRATED DEMO: Multi-agent coordination, realistic scenarios, hardware-in-loop mentioned
   - 4 = FIELD TEST: Outdoor tests, actual hardware platforms mentioned, test range activities
   - 5 = OPERATIONAL: Integration with named systems, operational deployment

3. SOURCE CREDIBILITY (0-10): How credible/important is this source?
   - 10: Government research institute or major defense contractor
   - 8-9: Top defense-oriented universities
   - 6-7: Other universities with aerospace programs
   - 4-5: General universities, international collaboration
   - 1-3: Preprints, unaffiliated authors

4. INTEGRATION READINESS (0-10): Does this discuss real-world implementation?
   - 10: Mentions specific named platforms
   - 7-9: Discusses hardware constraints (compute, power, size, weight)
   - 4-6: Mentions deployment considerations
   - 1-3: Pure theory, no implementation discussion
   - 0: No mention of real-world application

5. KEY TECHNICAL ACHIEVEMENTS: What significant results or capabilities are demonstrated?

6. LIMITATIONS: What limitations or challenges are mentioned?

7. CHINESE DEFENSE CONNECTION: Are any of the authors' listed affiliations Chinese defense institutions (defense universities, state defense contractors, military-affiliated labs)?

Return your analysis as JSON in this exact format:
{
  "relevance_score": <number 0-10>,
  "maturity_level": <number 1-5>,
  "credibility_score": <number 0-10>,
  "integration_score": <number 0-10>,
  "achievements": "<brief description>",
  "limitations": "<brief description>",
  "chinese_defense": <true/false>,
  "institution_type": "<university/defense_contractor/research_institute/other>",
  "reasoning": "<2-3 sentence explanation of scores>"
}

Be objective and precise. Only return the JSON, no other text.
"#;

/// Placeholder for missing metadata
pub const UNKNOWN: &str = "Unknown";

/// Placeholder for a missing abstract
pub const NO_ABSTRACT: &str = "No abstract available";

/// Fill `template` with the paper's metadata.
///
/// Missing fields become [`UNKNOWN`] (abstract: [`NO_ABSTRACT`]). Substitution is
/// a single pass over the template, so braces inside substituted values are kept
/// as written. Unrecognised `{...}` tokens are copied through.
pub fn build_scoring_prompt(template: &str, paper: &PaperRecord) -> String {
    let field = |name: &str| match name {
        "title" => Some(paper.title.as_deref().unwrap_or(UNKNOWN)),
        "authors" => Some(paper.authors.as_deref().unwrap_or(UNKNOWN)),
        "published" => Some(paper.published.as_deref().unwrap_or(UNKNOWN)),
        "abstract" => Some(paper.abstract_text.as_deref().unwrap_or(NO_ABSTRACT)),
        _ => None,
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| field(&after[..close]).map(|v| (close, v))) {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_scoring_prompt() {
        let mut paper = PaperRecord::new("Multi-UAV Cooperative Guidance via MARL");
        paper.authors = Some("A. Author, B. Author".to_string());
        paper.abstract_text = Some("We study {x} cooperative interception.".to_string());

        let prompt = build_scoring_prompt(SCORING_PROMPT, &paper);
        assert!(prompt.contains("Title: Multi-UAV Cooperative Guidance via MARL"));
        assert!(prompt.contains("Authors: A. Author, B. Author"));
        assert!(prompt.contains("Published: Unknown"));
        assert!(prompt.contains("We study {x} cooperative interception."));
        assert!(prompt.contains("\"relevance_score\""));
    }

    #[test]
    fn test_placeholders_in_metadata_are_not_expanded() {
        let mut paper = PaperRecord::new("On {abstract} and {authors} tokens");
        paper.authors = Some("A. Author".to_string());
        paper.abstract_text = Some("ABSTRACT BODY".to_string());

        assert_eq!(build_scoring_prompt("{title}", &paper), "On {abstract} and {authors} tokens");
        assert_eq!(
            build_scoring_prompt("T={title} A={abstract} {other}", &paper),
            "T=On {abstract} and {authors} tokens A=ABSTRACT BODY {other}"
        );
    }

    #[test]
    fn test_missing_fields_use_placeholders() {
        let prompt = build_scoring_prompt("{title}|{authors}|{abstract}", &PaperRecord::default());
        assert_eq!(prompt, "Unknown|Unknown|No abstract available");
    }
}
