use chrono::NaiveDate;
use kwrank_core::{CompetitorObservation, TrackedKeyword};
use kwrank_serp::SerpResult;

/// Picks the competing apps stored alongside each snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CompetitorRecorder {
    top_n: usize,
}

impl CompetitorRecorder {
    #[must_use]
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// The best-ranked `top_n` apps other than the tracked one, keeping their
    /// observed positions.
    #[must_use]
    pub fn record(
        &self,
        keyword: &TrackedKeyword,
        date: NaiveDate,
        result: &SerpResult,
    ) -> Vec<CompetitorObservation> {
        result
            .items
            .iter()
            .filter(|item| item.app_id != keyword.app_id)
            .take(self.top_n)
            .map(|item| CompetitorObservation {
                tracked_keyword_id: keyword.id,
                snapshot_date: date,
                competitor_app_id: item.app_id.clone(),
                competitor_name: item.display_name.clone(),
                position: item.position,
                rating_count: item.rating_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{keyword, serp_with_target_at};

    #[test]
    fn target_app_is_never_its_own_competitor() {
        let kw = keyword(4, "fitness tracker");
        let result = serp_with_target_at(&kw.app_id, Some(2));
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let observed = CompetitorRecorder::new(3).record(&kw, date, &result);

        let positions: Vec<u32> = observed.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![1, 3, 4]);
        assert!(observed.iter().all(|c| c.competitor_app_id != kw.app_id));
        assert!(observed.iter().all(|c| c.tracked_keyword_id == 4));
    }

    #[test]
    fn short_serp_yields_fewer_competitors() {
        let kw = keyword(4, "fitness tracker");
        let mut result = serp_with_target_at(&kw.app_id, None);
        result.items.truncate(2);

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let observed = CompetitorRecorder::new(10).record(&kw, date, &result);
        assert_eq!(observed.len(), 2);
    }
}
