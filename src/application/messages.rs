//! User- and admin-facing texts.

use crate::application::ledger::LedgerStats;
use crate::config::PaymentDetails;
use crate::domain::account::{UserAccount, UserId};
use crate::domain::payment::{PaymentKind, PaymentState, PendingPayment};
use crate::domain::ports::{Button, Keyboard};
use rust_decimal::Decimal;
use std::fmt::Write;

pub const APPROVE_ACTION: &str = "approve";
pub const REJECT_ACTION: &str = "reject";

pub fn money(amount: Decimal, currency: &str) -> String {
    format!("{amount:.2}{currency}")
}

fn user_label(payment: &PendingPayment) -> String {
    match &payment.username {
        Some(username) => format!("@{username}"),
        None => "no username".to_string(),
    }
}

fn describe_items(out: &mut String, payment: &PendingPayment, currency: &str) {
    if let Some(cart) = &payment.cart {
        for item in &cart.items {
            let _ = writeln!(
                out,
                "  • {} × {} = {}",
                item.name,
                item.quantity,
                money(item.line_total(), currency)
            );
        }
    }
}

pub fn deposit_instructions(
    payment: &PendingPayment,
    details: &PaymentDetails,
    window_minutes: u64,
    currency: &str,
) -> String {
    format!(
        "Top-up via {name}\n\n\
         Amount: {amount}\n\
         Number: {number}\n\
         Recipient: {owner}\n\
         Transfer comment: Deposit #{user}\n\n\
         After paying, send a screenshot of the receipt to this chat within {window_minutes} minutes.\n\
         Payment ID: {id}",
        name = details.name,
        amount = money(payment.amount, currency),
        number = details.number,
        owner = details.owner,
        user = payment.user_id,
        id = payment.id,
    )
}

pub fn purchase_instructions(
    payment: &PendingPayment,
    details: &PaymentDetails,
    window_minutes: u64,
    currency: &str,
) -> String {
    let mut text = format!("Order payment via {}\n\n", details.name);
    describe_items(&mut text, payment, currency);
    let _ = write!(
        text,
        "\nTotal: {amount}\n\
         Number: {number}\n\
         Recipient: {owner}\n\
         Transfer comment: Order #{id}\n\n\
         After paying, send a screenshot of the receipt to this chat within {window_minutes} minutes.",
        amount = money(payment.amount, currency),
        number = details.number,
        owner = details.owner,
        id = payment.id,
    );
    text
}

pub fn screenshot_received(payment: &PendingPayment, currency: &str) -> String {
    let what = match payment.kind {
        PaymentKind::Deposit => "The balance will be credited once an admin confirms the payment.",
        PaymentKind::Purchase => "Your order will be processed once an admin confirms the payment.",
    };
    format!(
        "Screenshot received!\n\nAmount: {}\nMethod: {}\nID: {}\n\n{what}",
        money(payment.amount, currency),
        payment.method.label(),
        payment.id,
    )
}

pub fn approval_request(payment: &PendingPayment, currency: &str) -> String {
    let title = match (payment.kind, payment.is_prepaid()) {
        (PaymentKind::Deposit, _) => "BALANCE TOP-UP REQUEST",
        (PaymentKind::Purchase, true) => "NEW ORDER (paid from balance)",
        (PaymentKind::Purchase, false) => "NEW ORDER",
    };
    let mut text = format!(
        "{title}\n\nUser: {}\nID: {}\n",
        user_label(payment),
        payment.user_id
    );
    describe_items(&mut text, payment, currency);
    if let Some(discount) = &payment.discount {
        let _ = writeln!(
            text,
            "Subtotal: {}\nDiscount {}%: -{}",
            money(discount.original_total, currency),
            discount.percent,
            money(discount.amount, currency)
        );
    }
    let _ = write!(
        text,
        "Amount: {}\nMethod: {}\nPayment ID: {}",
        money(payment.amount, currency),
        payment.method.label(),
        payment.id
    );
    if let Some(comment) = &payment.comment {
        let _ = write!(text, "\nComment: {comment}");
    }
    if payment.screenshot.is_some() {
        text.push_str("\nPayment screenshot attached");
    }
    text
}

pub fn approval_keyboard(payment: &PendingPayment) -> Keyboard {
    vec![
        vec![Button::new(
            "✅ Approve",
            format!("{APPROVE_ACTION}:{}", payment.id),
        )],
        vec![Button::new(
            "❌ Reject",
            format!("{REJECT_ACTION}:{}", payment.id),
        )],
    ]
}

pub fn balance_order_placed(payment: &PendingPayment, new_balance: Decimal, currency: &str) -> String {
    let mut text = format!(
        "Order {} placed and paid from your balance.\n\nCharged: {}\n",
        payment.id,
        money(payment.amount, currency)
    );
    if let Some(discount) = &payment.discount {
        let _ = writeln!(
            text,
            "You saved {} ({}% balance discount)",
            money(discount.amount, currency),
            discount.percent
        );
    }
    let _ = write!(text, "Balance: {}", money(new_balance, currency));
    text
}

pub fn deposit_approved(payment: &PendingPayment, new_balance: Decimal, currency: &str) -> String {
    format!(
        "Your top-up of {} was confirmed.\nBalance: {}",
        money(payment.amount, currency),
        money(new_balance, currency)
    )
}

pub fn order_approved(payment: &PendingPayment) -> String {
    format!("Your order {} was confirmed. Thank you for your purchase!", payment.id)
}

pub fn payment_rejected(
    payment: &PendingPayment,
    refunded: bool,
    support_contact: &str,
    currency: &str,
) -> String {
    let mut text = format!("Payment {} was rejected.", payment.id);
    if let Some(reason) = &payment.rejection_reason {
        let _ = write!(text, "\nReason: {reason}");
    }
    if refunded {
        let _ = write!(
            text,
            "\n{} was returned to your balance.",
            money(payment.amount, currency)
        );
    }
    let _ = write!(text, "\nQuestions? Contact {support_contact}");
    text
}

pub fn verdict_line(payment: &PendingPayment, admin_id: UserId) -> String {
    match (payment.state, &payment.rejection_reason) {
        (PaymentState::Approved, _) => format!("\n\n✅ APPROVED by admin {admin_id}"),
        (_, Some(reason)) => format!("\n\n❌ REJECTED by admin {admin_id}: {reason}"),
        (_, None) => format!("\n\n❌ REJECTED by admin {admin_id}"),
    }
}

pub fn payment_expired(payment: &PendingPayment) -> String {
    format!(
        "Payment {} expired: no screenshot arrived in time. Start again if you still want to pay.",
        payment.id
    )
}

pub fn admin_expired_notice(payment: &PendingPayment, currency: &str) -> String {
    format!(
        "Payment {} of user {} ({}) expired without a screenshot.",
        payment.id,
        payment.user_id,
        money(payment.amount, currency)
    )
}

pub fn payment_cancelled(payment: &PendingPayment) -> String {
    format!("Payment {} cancelled.", payment.id)
}

pub fn already_handled(payment_id: &str, state: Option<impl std::fmt::Display>) -> String {
    match state {
        Some(state) => format!("Payment {payment_id} was already handled ({state})."),
        None => format!("Payment {payment_id} was already handled."),
    }
}

pub fn pending_list(payments: &[PendingPayment], currency: &str) -> String {
    if payments.is_empty() {
        return "No pending payments.".to_string();
    }
    let mut text = format!("Pending payments: {}\n", payments.len());
    for payment in payments {
        let _ = write!(
            text,
            "\n{} | user {} | {} | {}",
            payment.id,
            payment.user_id,
            money(payment.amount, currency),
            payment.state
        );
    }
    text
}

pub fn stats(stats: &LedgerStats, pending: usize, currency: &str) -> String {
    format!(
        "Users: {}\nTotal balance: {}\nTotal spent: {}\nOrders: {}\nTransactions: {}\nPending payments: {}",
        stats.users,
        money(stats.total_balance, currency),
        money(stats.total_spent, currency),
        stats.total_orders,
        stats.transactions,
        pending
    )
}

/// Numbered account summaries, in the order given.
pub fn users_list(accounts: &[UserAccount], currency: &str) -> String {
    if accounts.is_empty() {
        return "No users yet.".to_string();
    }
    let mut text = "Users:\n".to_string();
    for (rank, account) in accounts.iter().enumerate() {
        let _ = write!(
            text,
            "\n{}. {} | balance {} | spent {} | orders {}",
            rank + 1,
            account.user_id,
            money(account.balance.value(), currency),
            money(account.total_spent.value(), currency),
            account.total_orders
        );
    }
    text
}
