use crate::model::{ActionType, DeltaSpec, MarketSnapshot, Order, OrderSide, PositionKey, PositionType, Venue};

/// Gap below which a rebalance leg is not worth an order (dust in the
/// minimal-diff sense, distinct from `sell_dust`'s off-share-class residual
/// threshold).
const MIN_ORDER_GAP: f64 = 1e-9;

/// `current`/`target` for `Perp` keys are *signed notional* (positive =
/// long, negative = short) so the direction of an open can be told apart
/// from a close; every other position type's `scaled_amount` is already a
/// signed underlying quantity and `current == target - delta`, so only the
/// sign of `delta` matters there.
fn action_for(position_type: PositionType, current: f64, target: f64) -> ActionType {
    match position_type {
        PositionType::AToken | PositionType::BaseToken => {
            if target >= current {
                ActionType::Supply
            } else {
                ActionType::Withdraw
            }
        }
        PositionType::VariableDebt => {
            if target >= current {
                ActionType::Borrow
            } else {
                ActionType::Repay
            }
        }
        PositionType::Staked => {
            if target >= current {
                ActionType::Stake
            } else {
                ActionType::Unstake
            }
        }
        PositionType::Spot => ActionType::SpotTrade,
        PositionType::Perp => {
            if target.abs() >= current.abs() {
                ActionType::PerpOpen
            } else {
                ActionType::PerpClose
            }
        }
    }
}

fn leg_order(key: &PositionKey, current: f64, target: f64, seq: usize) -> Order {
    let delta = target - current;
    Order {
        order_id: format!("{key}-{seq}"),
        venue: key.venue.to_string(),
        instrument: key.symbol.clone(),
        side: if delta >= 0.0 { OrderSide::Buy } else { OrderSide::Sell },
        action_type: action_for(key.position_type, current, target),
        amount: delta.abs(),
        limit_price: None,
        stop_loss: None,
        take_profit: None,
        atomic_group_id: None,
        expected_deltas: vec![DeltaSpec {
            key: key.clone(),
            signed_amount: delta,
        }],
    }
}

/// `rebalance_to_target(current, target)` (§4.6): the minimal order list
/// that closes the gap between current and target underlying allocation,
/// one order per key whose gap exceeds `MIN_ORDER_GAP`. Orders are sorted
/// by key for deterministic, reproducible routing order.
pub fn rebalance_to_target(
    current: &[(PositionKey, f64)],
    target: &[(PositionKey, f64)],
) -> Vec<Order> {
    use std::collections::BTreeMap;

    let mut legs: BTreeMap<String, (PositionKey, f64, f64)> = BTreeMap::new();
    for (key, amount) in current {
        legs.entry(key.to_string())
            .or_insert_with(|| (key.clone(), 0.0, 0.0))
            .1 += amount;
    }
    for (key, amount) in target {
        legs.entry(key.to_string())
            .or_insert_with(|| (key.clone(), 0.0, 0.0))
            .2 += amount;
    }

    legs.into_values()
        .enumerate()
        .filter(|(_, (_, current, target))| (target - current).abs() > MIN_ORDER_GAP)
        .map(|(seq, (key, current, target))| leg_order(&key, current, target, seq))
        .collect()
}

/// `enter_full(equity)`: construct initial target positions from nothing.
pub fn enter_full(target: &[(PositionKey, f64)]) -> Vec<Order> {
    rebalance_to_target(&[], target)
}

/// `enter_partial(delta_equity)`: scale an existing allocation up to match
/// additional equity — built as a rebalance from the pre-deposit target to
/// the post-deposit target (both supplied by the caller already scaled).
pub fn enter_partial(
    current: &[(PositionKey, f64)],
    scaled_target: &[(PositionKey, f64)],
) -> Vec<Order> {
    rebalance_to_target(current, scaled_target)
}

/// `exit_partial(delta_equity)`: the same shape as `enter_partial`, scaling
/// down proportionally on withdrawal.
pub fn exit_partial(
    current: &[(PositionKey, f64)],
    scaled_target: &[(PositionKey, f64)],
) -> Vec<Order> {
    rebalance_to_target(current, scaled_target)
}

/// `exit_full()`: unwind everything to the share-class currency.
pub fn exit_full(current: &[(PositionKey, f64)]) -> Vec<Order> {
    rebalance_to_target(current, &[])
}

/// `sell_dust(tokens)`: convert off-share-class residuals above `threshold`
/// into the share-class currency via a spot sell.
pub fn sell_dust(tokens: &[(PositionKey, f64)], threshold: f64) -> Vec<Order> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, (_, amount))| amount.abs() > threshold)
        .map(|(seq, (key, amount))| leg_order(key, *amount, 0.0, seq))
        .collect()
}

/// `delta_adjust(drift)`: resize the hedge legs in `hedge_keys` by a
/// uniform fraction so the aggregate delta moves from `current_delta`
/// toward `target_delta`. Each leg's existing perp size is read from
/// `current` and nudged by the same signed correction (distributed
/// proportionally to each leg's present size).
pub fn delta_adjust(
    current: &[(PositionKey, f64)],
    correction: f64,
) -> Vec<Order> {
    let total: f64 = current.iter().map(|(_, amount)| amount.abs()).sum();
    if total < MIN_ORDER_GAP {
        return Vec::new();
    }
    current
        .iter()
        .enumerate()
        .map(|(seq, (key, amount))| {
            let share = amount.abs() / total;
            leg_order(key, *amount, amount + correction * share, seq)
        })
        .filter(|o| o.amount > MIN_ORDER_GAP)
        .collect()
}

/// `risk_reduce(dimension)`: deleverage a set of collateral/debt legs by a
/// uniform `fraction` of their current underlying amount (e.g. repay a
/// third of outstanding debt and withdraw the matching collateral share).
/// Bypasses normal rebalancing — called only when `risk.overall_status ==
/// Critical`.
pub fn risk_reduce(legs: &[(PositionKey, f64)], fraction: f64) -> Vec<Order> {
    legs.iter()
        .enumerate()
        .map(|(seq, (key, amount))| leg_order(key, *amount, amount * (1.0 - fraction), seq))
        .filter(|o| o.amount > MIN_ORDER_GAP)
        .collect()
}

/// A `WalletTransfer` leg moving margin cash between the wallet and a CEX
/// venue, sized 1:1 against a perp leg's own notional change so the venue
/// always carries a real balance for `RiskMonitor::compute_cex_margin` to
/// read (§4.7 names `wallet_transfer` as an action type; nothing previously
/// emitted it). Opening grows the position's absolute size and pulls cash
/// from the wallet into the CEX; closing shrinks it and returns cash.
fn margin_transfer_for_perp(
    perp_key: &PositionKey,
    is_open: bool,
    delta_underlying: f64,
    price_in_share_class: f64,
    share_class_asset: &str,
    seq: usize,
) -> Option<Order> {
    let magnitude = delta_underlying.abs() * price_in_share_class;
    if magnitude <= MIN_ORDER_GAP {
        return None;
    }
    let quote_amount = if is_open { magnitude } else { -magnitude };
    let wallet_key = PositionKey::new(Venue::Wallet, PositionType::BaseToken, share_class_asset);
    let cex_key = PositionKey::new(perp_key.venue, PositionType::BaseToken, share_class_asset);

    Some(Order {
        order_id: format!("{perp_key}-margin-{seq}"),
        venue: Venue::Wallet.to_string(),
        instrument: share_class_asset.to_string(),
        side: if is_open { OrderSide::Sell } else { OrderSide::Buy },
        action_type: ActionType::WalletTransfer,
        amount: magnitude,
        limit_price: None,
        stop_loss: None,
        take_profit: None,
        atomic_group_id: None,
        expected_deltas: vec![
            DeltaSpec { key: wallet_key, signed_amount: -quote_amount },
            DeltaSpec { key: cex_key, signed_amount: quote_amount },
        ],
    })
}

/// Post-processes a decision's order list: every `PerpOpen`/`PerpClose`
/// order gets a matching `WalletTransfer` margin leg inserted immediately
/// before it (open, so the cash lands before the position grows) or after
/// it (close, returning cash once the position has shrunk). Every mode that
/// can emit perp orders routes its final order list through this so a CEX
/// venue is never left with an un-margined position (§4.4).
pub fn attach_perp_margin_transfers(
    orders: Vec<Order>,
    market: &MarketSnapshot,
    share_class_asset: &str,
) -> Vec<Order> {
    let share_class_usd = market.usd_price(share_class_asset).unwrap_or(1.0).max(1e-12);
    let mut out = Vec::with_capacity(orders.len());

    for (seq, order) in orders.into_iter().enumerate() {
        let is_open = order.action_type == ActionType::PerpOpen;
        let is_close = order.action_type == ActionType::PerpClose;
        if !is_open && !is_close {
            out.push(order);
            continue;
        }

        let Some(leg) = order.expected_deltas.first() else {
            out.push(order);
            continue;
        };
        let perp_key = leg.key.clone();
        let delta: f64 = order.expected_deltas.iter().map(|d| d.signed_amount).sum();
        let asset_usd = market.usd_price(&perp_key.symbol).unwrap_or(share_class_usd).max(1e-12);
        let price_in_share_class = asset_usd / share_class_usd;

        let margin = margin_transfer_for_perp(&perp_key, is_open, delta, price_in_share_class, share_class_asset, seq);

        if is_open {
            if let Some(m) = margin {
                out.push(m);
            }
            out.push(order);
        } else {
            out.push(order);
            if let Some(m) = margin {
                out.push(m);
            }
        }
    }

    out
}
