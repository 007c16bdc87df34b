use crate::schema::NormalizedDeal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerScore {
    pub seller: String,
    pub open_gross: f64,
    pub open_count: usize,
    pub won_gross: f64,
    pub won_count: usize,
    pub lost_count: usize,
    /// Won deals as a percentage of closed deals; 0 with no closed deals.
    pub win_rate: f64,
    pub average_won_cycle_days: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SellerScoreboard {
    pub sellers: Vec<SellerScore>,
}

#[derive(Default)]
struct CycleTotals {
    days: f64,
    deals: usize,
}

fn score_for<'a>(scores: &'a mut BTreeMap<String, SellerScore>, owner: &str) -> &'a mut SellerScore {
    scores
        .entry(owner.to_string())
        .or_insert_with(|| SellerScore {
            seller: owner.to_string(),
            ..SellerScore::default()
        })
}

impl SellerScoreboard {
    /// One line per owner found in any of the three collections, sorted by name.
    pub fn from_deals(
        open: &[NormalizedDeal],
        won: &[NormalizedDeal],
        lost: &[NormalizedDeal],
    ) -> Self {
        let mut scores: BTreeMap<String, SellerScore> = BTreeMap::new();
        let mut cycles: BTreeMap<String, CycleTotals> = BTreeMap::new();

        for deal in open {
            let score = score_for(&mut scores, &deal.owner);
            score.open_gross += deal.gross_value;
            score.open_count += 1;
        }

        for deal in won {
            let score = score_for(&mut scores, &deal.owner);
            score.won_gross += deal.gross_value;
            score.won_count += 1;

            if let Some(days) = deal.cycle_days {
                let totals = cycles.entry(deal.owner.clone()).or_default();
                totals.days += days;
                totals.deals += 1;
            }
        }

        for deal in lost {
            score_for(&mut scores, &deal.owner).lost_count += 1;
        }

        let sellers = scores
            .into_values()
            .map(|mut score| {
                let closed = score.won_count + score.lost_count;
                score.win_rate = if closed == 0 {
                    0.0
                } else {
                    score.won_count as f64 * 100.0 / closed as f64
                };
                score.average_won_cycle_days = cycles
                    .get(&score.seller)
                    .filter(|totals| totals.deals > 0)
                    .map(|totals| totals.days / totals.deals as f64);
                score
            })
            .collect();

        Self { sellers }
    }

    pub fn get(&self, seller: &str) -> Option<&SellerScore> {
        self.sellers.iter().find(|s| s.seller == seller)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
