use serde::Deserialize;

/// A discussion post summary from the listing query. Transient: only the id
/// survives a run, in the visited ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    #[serde(rename = "uuid")]
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "topicId")]
    pub topic_id: i64,
}

/// One page of posts plus the source's own pagination flag.
#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub has_next_page: bool,
}

#[derive(Debug, Clone)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// A role from the internal taxonomy, read-only here. `profile_name` comes
/// from the owning job profile.
#[derive(Debug, Clone)]
pub struct JobRole {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub profile_name: String,
}

/// Read model for the `list` command, company name denormalized for display.
#[derive(Debug, Clone)]
pub struct Interview {
    pub id: String,
    pub company_name: String,
    pub job_role_id: String,
    pub title: String,
    pub difficulty: String,
    pub offer_status: String,
    pub no_of_rounds: i64,
    pub overall_rating: f64,
    pub created_at: String,
}

/// Insert model for an interview. Enums are already normalized and foreign
/// keys already resolved by the time one of these is built.
#[derive(Debug, Clone)]
pub struct NewInterview {
    pub company_id: String,
    pub user_id: String,
    pub job_role_id: String,
    pub slug: String,
    pub title: String,
    pub location: Option<String>,
    pub date: String,
    pub difficulty: Difficulty,
    pub no_of_rounds: i64,
    pub interview_process: Option<String>,
    pub preparation_sources: Option<String>,
    pub overall_rating: f64,
    pub is_anonymous: bool,
    pub status: String,
    pub offer_status: OfferStatus,
}

#[derive(Debug, Clone)]
pub struct NewRound {
    pub name: String,
    pub duration: Option<String>,
    pub difficulty: Difficulty,
    pub experience: String,
    pub key_takeaways: Option<String>,
    pub order_index: i64,
}

/// Interview difficulty. Anything outside the closed set normalizes to
/// Medium before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "EASY" => Difficulty::Easy,
            "HARD" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }
}

/// Offer outcome. The extraction service reports a wider label space
/// ("Offer", "Accepted", "Declined", "Unknown", ...) that collapses onto
/// this closed set; unrecognized labels count as Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferStatus {
    Offered,
    Pending,
    Rejected,
}

impl OfferStatus {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "OFFER" | "OFFERED" | "ACCEPTED" => OfferStatus::Offered,
            "REJECTED" | "DECLINED" => OfferStatus::Rejected,
            _ => OfferStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Offered => "OFFERED",
            OfferStatus::Pending => "PENDING",
            OfferStatus::Rejected => "REJECTED",
        }
    }
}

/// Derive a company slug from an extracted name: lowercased, with runs of
/// non-alphanumerics collapsed to single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug
}
