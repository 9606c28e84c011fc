use anyhow::Result;
use chrono::{Local, Utc};
use tracing::{debug, error, info, warn};

use crate::ai::{Extractor, InterviewDetails, RoundDetails, UNKNOWN_SENTINEL};
use crate::config::Config;
use crate::db::Database;
use crate::discord::{status_color, Embed, EmbedField, EmbedFooter, Notifier};
use crate::leetcode::PostSource;
use crate::models::{slugify, Company, JobRole, NewInterview, NewRound, Post};

/// Identity stamped on records the pipeline authors.
const SYSTEM_USER_ID: &str = "1";
const PUBLISHED_STATUS: &str = "PUBLISHED";
const ROUND_PREVIEW_CHARS: usize = 150;

/// Terminal outcome for one post. The variant decides whether the post id
/// lands in the visited ledger; unmarked posts are retried by a later sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// Already in the ledger; nothing done.
    AlreadyVisited,
    /// Final semantic judgment (not an interview, no company, or the
    /// classification call itself failed): marked visited.
    NotRelevant,
    /// No job role resolvable anywhere: marked visited and reported.
    Abandoned,
    /// Transient detail-extraction failure: left unmarked.
    RetryLater,
    /// Interview persisted, notification attempted: marked visited.
    Persisted,
}

#[derive(Debug, Default)]
pub struct SweepStats {
    pub persisted: usize,
    pub skipped: usize,
    pub retried: usize,
}

impl SweepStats {
    fn record(&mut self, outcome: &PostOutcome) {
        match outcome {
            PostOutcome::Persisted => self.persisted += 1,
            PostOutcome::RetryLater => self.retried += 1,
            _ => self.skipped += 1,
        }
    }
}

/// Sequences one post end-to-end through discovery, classification, role
/// resolution, detail extraction, persistence and notification. One post at
/// a time, strictly in source order.
pub struct Pipeline<'a> {
    config: &'a Config,
    db: &'a Database,
    source: &'a dyn PostSource,
    extractor: &'a dyn Extractor,
    notifier: &'a dyn Notifier,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        db: &'a Database,
        source: &'a dyn PostSource,
        extractor: &'a dyn Extractor,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            db,
            source,
            extractor,
            notifier,
        }
    }

    /// One bounded sweep over the source. Stops early on an empty page, on
    /// the source's own no-next-page signal, or on a hard source failure.
    pub fn run_sweep(&self) -> Result<SweepStats> {
        let mut stats = SweepStats::default();
        let page_size = self.config.leetcode.page_size;

        for page in 0..self.config.leetcode.max_pages {
            let skip = page * page_size;
            info!(page = page + 1, skip, "fetching discussion page");

            let page_data = match self.source.fetch_page(page_size, skip) {
                Ok(p) => p,
                Err(e) => {
                    error!("discussion page fetch failed: {e:#}");
                    break;
                }
            };

            if page_data.posts.is_empty() {
                info!("no posts returned, stopping sweep");
                break;
            }

            for post in &page_data.posts {
                match self.process_post(post) {
                    Ok(outcome) => {
                        debug!(post_id = %post.id, ?outcome, "post done");
                        stats.record(&outcome);
                    }
                    Err(e) => {
                        // Persistence-class failure: leave the post unmarked
                        // so the next sweep retries it.
                        error!(post_id = %post.id, "post processing failed: {e:#}");
                        stats.retried += 1;
                    }
                }
            }

            if !page_data.has_next_page {
                info!("source reports no further pages");
                break;
            }
        }

        Ok(stats)
    }

    /// The per-post state machine. Classification outcomes are final and
    /// mark the post visited; a failed detail extraction is transient and
    /// does not.
    pub fn process_post(&self, post: &Post) -> Result<PostOutcome> {
        if self.db.is_post_visited(&post.id)? {
            debug!(post_id = %post.id, "already visited, skipping");
            return Ok(PostOutcome::AlreadyVisited);
        }

        info!(post_id = %post.id, title = %post.title, "processing post");

        let full_content = self.source.fetch_post_content(post.topic_id);
        let content = if full_content.is_empty() {
            debug!(post_id = %post.id, "no detail content, falling back to summary");
            post.summary.as_str()
        } else {
            full_content.as_str()
        };

        let Some(classification) = self.extractor.classify(&post.title, content) else {
            // A permanently unparseable post would otherwise retry forever;
            // treat a classification failure like a negative result.
            info!(post_id = %post.id, "classification failed, marking visited");
            self.db.mark_post_visited(&post.id)?;
            return Ok(PostOutcome::NotRelevant);
        };

        if !classification.is_interview_experience {
            info!(post_id = %post.id, "not an interview experience");
            self.db.mark_post_visited(&post.id)?;
            return Ok(PostOutcome::NotRelevant);
        }

        let company_name = match classification
            .company_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(name) => name.to_string(),
            None => {
                info!(post_id = %post.id, "interview experience without a company name");
                self.db.mark_post_visited(&post.id)?;
                return Ok(PostOutcome::NotRelevant);
            }
        };

        let company = self
            .db
            .get_or_create_company(&company_name, &slugify(&company_name))?;
        debug!(company = %company.name, company_id = %company.id, "company resolved");

        let roles = self.db.get_job_roles_for_company(&company.id)?;

        let Some(details) = self.extractor.extract_details(&post.title, content, &roles) else {
            info!(post_id = %post.id, "detail extraction failed, leaving unmarked for retry");
            return Ok(PostOutcome::RetryLater);
        };

        let resolved = match self.resolve_role(&roles, details.job_role_id.as_deref())? {
            Some(role) => role,
            None => {
                error!(
                    post_id = %post.id,
                    company = %company.name,
                    "no job role resolvable for this post, abandoning"
                );
                self.db.mark_post_visited(&post.id)?;
                return Ok(PostOutcome::Abandoned);
            }
        };
        debug!(role = %resolved.name, role_id = %resolved.id, "job role resolved");

        let interview = build_interview(&company, &resolved, post, &details);
        let interview_id = self.db.create_interview(&interview)?;
        for round in &details.rounds {
            self.db.create_interview_round(&interview_id, &build_round(round))?;
        }
        info!(
            interview_id = %interview_id,
            rounds = details.rounds.len(),
            confidence = details.confidence_score,
            "interview persisted"
        );

        self.notify(&company, &resolved, &interview, &interview_id, &details);

        self.db.mark_post_visited(&post.id)?;
        Ok(PostOutcome::Persisted)
    }

    /// Role-resolution fallback chain: valid claimed id, then a
    /// "software engineer"-named role at this company, then the company's
    /// first role, then a cross-company lookup. Prefers a same-company
    /// generic role over a cross-company one.
    fn resolve_role(&self, roles: &[JobRole], claimed: Option<&str>) -> Result<Option<JobRole>> {
        if let Some(role) = resolve_role_from_list(roles, claimed) {
            if claimed != Some(role.id.as_str()) {
                warn!(
                    claimed = claimed.unwrap_or("<none>"),
                    fallback = %role.name,
                    "extracted job role id not valid for company, using fallback"
                );
            }
            return Ok(Some(role.clone()));
        }

        let global = self.db.find_job_role_global("Software Engineer")?;
        if let Some(role) = &global {
            warn!(role = %role.name, "falling back to global software engineer role");
        }
        Ok(global)
    }

    /// Best-effort digest. Suppressed entirely when the rendered description
    /// fails the quality gate; failures are logged and swallowed.
    fn notify(
        &self,
        company: &Company,
        role: &JobRole,
        interview: &NewInterview,
        interview_id: &str,
        details: &InterviewDetails,
    ) {
        let description = build_round_description(&details.rounds);
        if !passes_quality_gate(&description) {
            info!(interview_id = %interview_id, "notification suppressed by quality gate");
            return;
        }

        let embed = self.build_embed(company, role, interview, interview_id, description);
        match self.notifier.send(None, Some(embed)) {
            Ok(()) => info!(interview_id = %interview_id, "notification sent"),
            Err(e) => warn!(interview_id = %interview_id, "notification failed: {e:#}"),
        }
    }

    fn build_embed(
        &self,
        company: &Company,
        role: &JobRole,
        interview: &NewInterview,
        interview_id: &str,
        description: String,
    ) -> Embed {
        let location = presentable_location(interview.location.as_deref());
        let loc_part = location
            .map(|loc| format!(" | {}", loc))
            .unwrap_or_default();
        let title = format!(
            "{} | {} | {}{} | {}",
            company.name,
            role.profile_name,
            role.name,
            loc_part,
            interview.offer_status.as_str()
        );

        let url = format!(
            "{}/{}/{}",
            self.config.discord.interview_base_url, interview_id, interview.slug
        );

        Embed {
            title,
            url,
            color: status_color(interview.offer_status),
            fields: vec![
                field("Company", &company.name),
                field("Role", &role.name),
                field("Difficulty", interview.difficulty.as_str()),
                field("Status", interview.offer_status.as_str()),
                field("Rounds", &interview.no_of_rounds.to_string()),
                field("Location", location.unwrap_or("Unspecified")),
            ],
            description,
            footer: EmbedFooter {
                text: format!(
                    "Roundz AI | Interview Experiences | {}",
                    Local::now().format("%m/%d/%Y")
                ),
            },
        }
    }
}

/// The in-company part of the fallback chain. Returns None when the company
/// has no roles at all, which sends the caller to the global lookup.
pub fn resolve_role_from_list<'r>(
    roles: &'r [JobRole],
    claimed: Option<&str>,
) -> Option<&'r JobRole> {
    if let Some(claimed_id) = claimed {
        if let Some(role) = roles.iter().find(|r| r.id == claimed_id) {
            return Some(role);
        }
    }

    roles
        .iter()
        .find(|r| r.name.to_lowercase().contains("software engineer"))
        .or_else(|| roles.first())
}

fn build_interview(
    company: &Company,
    role: &JobRole,
    post: &Post,
    details: &InterviewDetails,
) -> NewInterview {
    NewInterview {
        company_id: company.id.clone(),
        user_id: SYSTEM_USER_ID.to_string(),
        job_role_id: role.id.clone(),
        slug: post.slug.clone(),
        title: post.title.clone(),
        location: details.location.clone(),
        date: Utc::now().to_rfc3339(),
        difficulty: details.difficulty,
        no_of_rounds: details.number_of_rounds,
        interview_process: details.interview_process.clone(),
        preparation_sources: details.preparation_source.clone(),
        overall_rating: details.overall_rating,
        is_anonymous: details.is_anonymous,
        status: PUBLISHED_STATUS.to_string(),
        offer_status: details.offer_status,
    }
}

fn build_round(round: &RoundDetails) -> NewRound {
    NewRound {
        name: round.name.clone(),
        duration: round.duration.clone(),
        difficulty: round.difficulty,
        experience: round.experience.clone(),
        key_takeaways: round.key_takeaways.clone(),
        order_index: round.sequence,
    }
}

/// Round-by-round digest body: an emoji keyed on the round name, the bold
/// name, and a preview of the candidate's account.
pub fn build_round_description(rounds: &[RoundDetails]) -> String {
    let mut description = String::new();
    for round in rounds {
        description.push_str(&format!(
            "{} **{}**\n{}\n\n",
            round_emoji(&round.name),
            round.name,
            preview(&round.experience, ROUND_PREVIEW_CHARS)
        ));
    }
    description
}

fn round_emoji(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains("coding") || lower.contains("dsa") {
        "💻"
    } else if lower.contains("system") && lower.contains("design") {
        "🏗️"
    } else if lower.contains("behavioral") || lower.contains("manager") {
        "💬"
    } else {
        "🔘"
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// A digest is worth sending only when the rendered rounds say something:
/// non-empty and free of the placeholder sentinel.
pub fn passes_quality_gate(description: &str) -> bool {
    !description.trim().is_empty() && !description.contains(UNKNOWN_SENTINEL)
}

fn presentable_location(location: Option<&str>) -> Option<&str> {
    let loc = location?.trim();
    let lower = loc.to_lowercase();
    let invalid = ["", "none", "unknown", "null", "<unknown>"];
    if invalid.contains(&lower.as_str()) {
        None
    } else {
        Some(loc)
    }
}

fn field(name: &str, value: &str) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline: true,
    }
}
