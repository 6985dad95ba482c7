//! Renders change events as Discord markdown.

use crate::cdp::{Owner, Position, BASE_UNITS_PER_COIN};
use crate::engine::{ChangeEvent, CloseCause};
use crate::risk::{AssessedPosition, RiskState};
use crate::utils::decimal::{format_debt, group_thousands, round_to_str, to_percent};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Cycle-wide values shown alongside every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatContext {
    /// Total collateral of the new snapshot in ADA
    pub tvl_ada: Decimal,
}

impl FormatContext {
    /// Build from a lovelace total.
    pub fn from_lovelace(total: u128) -> Self {
        let lovelace = i128::try_from(total)
            .ok()
            .and_then(|t| Decimal::try_from_i128_with_scale(t, 0).ok())
            .unwrap_or(Decimal::MAX);
        let tvl_ada = lovelace / Decimal::from(BASE_UNITS_PER_COIN);
        Self { tvl_ada }
    }
}

/// Custom Discord emoji for an iAsset, if the server has one.
pub fn iasset_emoji(asset: &str) -> &'static str {
    match asset {
        "iUSD" => "<:iUSDemoji:1230941267622367393>",
        "iBTC" => "<:iBTCemoji:1230941348744401047>",
        "iETH" => "<:iETHemoji:1230941175607722136>",
        "iSOL" => "<:iSOLemoji:131139670814346479>",
        _ => "",
    }
}

/// Size marker for an ADA amount; one siren per full million.
pub fn fish_scale_emoji(ada: Decimal) -> String {
    if ada <= Decimal::ZERO {
        String::new()
    } else if ada < dec!(1_000) {
        "🦐".to_string()
    } else if ada < dec!(10_000) {
        "🐟".to_string()
    } else if ada < dec!(100_000) {
        "🐬".to_string()
    } else if ada < dec!(1_000_000) {
        "🦈".to_string()
    } else {
        let count = (ada / dec!(1_000_000)).floor().to_usize().unwrap_or(0);
        format!("🐳{}", "🚨".repeat(count))
    }
}

/// Block explorer links for a transaction.
pub fn explorer_links(tx_hash: &str) -> String {
    format!(
        "[cexplorer.io](<https://cexplorer.io/tx/{tx}>)  ✧  \
         [adastat.net](<https://adastat.net/transactions/{tx}>)  ✧  \
         [cardanoscan.io](<https://cardanoscan.io/transaction/{tx}>)  ✧  \
         [explorer.cardano.org](https://explorer.cardano.org/en/transaction?id={tx})",
        tx = tx_hash
    )
}

/// Maps change events to message text. Pure; never fails.
#[derive(Debug, Clone)]
pub struct NotificationFormatter {
    include_links: bool,
}

impl Default for NotificationFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationFormatter {
    pub fn new() -> Self {
        Self {
            include_links: true,
        }
    }

    /// Omit explorer links (useful for terminal output).
    pub fn without_links(mut self) -> Self {
        self.include_links = false;
        self
    }

    /// Render one event.
    pub fn format(&self, event: &ChangeEvent, ctx: &FormatContext) -> String {
        let subject = event.subject();
        let position = &subject.position;
        let emoji = iasset_emoji(position.asset.as_str());
        let mut lines = Vec::with_capacity(8);

        match event {
            ChangeEvent::Opened(_) => {
                lines.push(with_emoji(emoji, "**CDP opened**"));
                lines.push(collateral_line("+", position));
            }
            ChangeEvent::Closed { cause, .. } => {
                let header = match cause {
                    CloseCause::Liquidated => "**CDP liquidated** 💥",
                    CloseCause::Closed => "**CDP closed**",
                };
                lines.push(with_emoji(emoji, header));
                lines.push(collateral_line("-", position));
            }
            ChangeEvent::RiskChanged { old, new, .. } => {
                let alarm = if *new == RiskState::Liquidatable { " ⚠️" } else { "" };
                lines.push(with_emoji(
                    emoji,
                    &format!("**CDP risk: {} → {}**{}", old, new, alarm),
                ));
                lines.push(collateral_line("", position));
            }
        }

        lines.push(format!(
            "- Debt: {} {}",
            format_debt(position.minted()),
            position.asset
        ));

        if let Some(line) = ratio_line(subject) {
            lines.push(line);
        }

        let risk_label = match event {
            ChangeEvent::Closed { .. } => "Last risk",
            _ => "Risk",
        };
        lines.push(format!("- {}: {}", risk_label, subject.risk.state));
        lines.push(format!("- New TVL: {} ADA", group_thousands(ctx.tvl_ada, 0)));

        lines.push(match &position.owner {
            Owner::Known(hex) => format!("- Owner: `{}`", hex),
            Owner::Unknown => "- Owner: unknown".to_string(),
        });

        // A closed output's spending transaction is not known from snapshots.
        if self.include_links && !matches!(event, ChangeEvent::Closed { .. }) {
            lines.push(explorer_links(&position.key.output_hash));
        }

        lines.join("\n")
    }
}

fn with_emoji(emoji: &str, text: &str) -> String {
    if emoji.is_empty() {
        text.to_string()
    } else {
        format!("{} {}", emoji, text)
    }
}

fn collateral_line(sign: &str, position: &Position) -> String {
    let ada = position.collateral_ada();
    format!(
        "- {}{} ADA {}",
        sign,
        group_thousands(ada, 0),
        fish_scale_emoji(ada)
    )
    .trim_end()
    .to_string()
}

fn ratio_line(subject: &AssessedPosition) -> Option<String> {
    let ratio = subject.risk.ratio?;
    Some(format!(
        "- Ratio: {}% (liquidation at {}%)",
        round_to_str(to_percent(ratio), 1),
        round_to_str(to_percent(subject.risk.threshold), 1)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{AssetCode, PositionKey};
    use crate::risk::RiskAssessment;

    const HASH: &str = "7c1f0e3a9b2d4c5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6";

    fn assessed(owner: Owner, state: RiskState, ratio: Option<Decimal>) -> AssessedPosition {
        AssessedPosition {
            position: Position {
                key: PositionKey::new(HASH, 0),
                owner,
                asset: AssetCode::parse("iUSD").unwrap(),
                collateral_amount: 150_000_000_000,
                minted_amount: 52_345_670_000,
            },
            risk: RiskAssessment {
                state,
                ratio,
                threshold: dec!(1.2),
            },
        }
    }

    fn ctx() -> FormatContext {
        FormatContext::from_lovelace(123_456_789_000_000)
    }

    #[test]
    fn test_opened_message() {
        let event = ChangeEvent::Opened(assessed(
            Owner::Known("ab".repeat(28)),
            RiskState::Healthy,
            Some(dec!(2.8656)),
        ));

        let msg = NotificationFormatter::new().format(&event, &ctx());
        let lines: Vec<&str> = msg.lines().collect();

        assert_eq!(lines[0], "<:iUSDemoji:1230941267622367393> **CDP opened**");
        assert_eq!(lines[1], "- +150,000 ADA 🦈");
        assert_eq!(lines[2], "- Debt: 52,346 iUSD");
        assert_eq!(lines[3], "- Ratio: 286.6% (liquidation at 120%)");
        assert_eq!(lines[4], "- Risk: Healthy");
        assert_eq!(lines[5], "- New TVL: 123,456,789 ADA");
        assert_eq!(lines[6], format!("- Owner: `{}`", "ab".repeat(28)));
        assert!(lines[7].contains(&format!("https://cexplorer.io/tx/{}", HASH)));
    }

    #[test]
    fn test_liquidated_message_has_no_links() {
        let event = ChangeEvent::Closed {
            last_known: assessed(Owner::Unknown, RiskState::Liquidatable, Some(dec!(1.1))),
            cause: CloseCause::Liquidated,
        };

        let msg = NotificationFormatter::new().format(&event, &ctx());

        assert!(msg.starts_with("<:iUSDemoji:1230941267622367393> **CDP liquidated**"));
        assert!(msg.contains("- -150,000 ADA"));
        assert!(msg.contains("- Last risk: Liquidatable"));
        assert!(msg.contains("- Owner: unknown"));
        assert!(!msg.contains("cexplorer"));
    }

    #[test]
    fn test_risk_change_message() {
        let event = ChangeEvent::RiskChanged {
            position: assessed(Owner::Unknown, RiskState::Liquidatable, Some(dec!(1.15))),
            old: RiskState::AtRisk,
            new: RiskState::Liquidatable,
        };

        let msg = NotificationFormatter::new().without_links().format(&event, &ctx());

        assert!(msg.contains("**CDP risk: At risk → Liquidatable** ⚠️"));
        assert!(msg.contains("- Ratio: 115% (liquidation at 120%)"));
        assert!(!msg.contains("cardanoscan"));
    }

    #[test]
    fn test_unminted_has_no_ratio_line() {
        let event = ChangeEvent::Opened(assessed(Owner::Unknown, RiskState::Unminted, None));

        let msg = NotificationFormatter::new().format(&event, &ctx());

        assert!(!msg.contains("Ratio"));
        assert!(msg.contains("- Risk: Unminted"));
    }

    #[test]
    fn test_fish_scale() {
        assert_eq!(fish_scale_emoji(Decimal::ZERO), "");
        assert_eq!(fish_scale_emoji(dec!(500)), "🦐");
        assert_eq!(fish_scale_emoji(dec!(5_000)), "🐟");
        assert_eq!(fish_scale_emoji(dec!(50_000)), "🐬");
        assert_eq!(fish_scale_emoji(dec!(2_500_000)), "🐳🚨🚨");
    }
}
