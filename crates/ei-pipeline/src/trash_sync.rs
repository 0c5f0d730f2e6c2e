//! Trash-sync job (SPEC_FULL §4.9). Pages the provider's trash label and
//! stamps newly-seen trashed messages. Idempotent — re-running over an
//! already-stamped message is a no-op — and deliberately narrow: it never
//! touches assignments or outbox rows (spec SPEC_FULL §9 open-question
//! decision: trash is a terminal provider-side event, not a label change
//! to mirror back through the labeling pipeline).

use chrono::Utc;
use ei_core::ports::MessageStore;
use ei_provider::Provider;

const TRASH_QUERY: &str = "in:trash";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrashSyncReport {
    pub newly_trashed: u64,
}

pub async fn run(messages: &dyn MessageStore, provider: &dyn Provider) -> ei_core::Result<TrashSyncReport> {
    let mut report = TrashSyncReport::default();
    let mut page_token: Option<String> = None;
    let now = Utc::now();

    loop {
        let page = provider.list_messages(TRASH_QUERY, page_token.as_deref(), PAGE_SIZE).await?;
        for id in &page.message_ids {
            if let Some(existing) = messages.get(id).await? {
                if existing.trashed_at.is_some() {
                    continue;
                }
            }
            messages.stamp_trashed(id, now).await?;
            report.newly_trashed += 1;
        }
        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    Ok(report)
}
