use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "auth_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref REFRESHES_COUNTER: CounterVec = register_counter_vec!(
        "auth_token_refreshes_total",
        "Refresh token exchanges by outcome",
        &["status"]
    ).unwrap();

    pub static ref PASSWORD_RESETS_COUNTER: CounterVec = register_counter_vec!(
        "auth_password_resets_total",
        "Password reset requests and completions by flow",
        &["flow", "stage"]
    ).unwrap();
}

pub fn login(status: &str) {
    LOGINS_COUNTER.with_label_values(&[status]).inc();
}

pub fn refresh(status: &str) {
    REFRESHES_COUNTER.with_label_values(&[status]).inc();
}

pub fn password_reset(flow: &str, stage: &str) {
    PASSWORD_RESETS_COUNTER.with_label_values(&[flow, stage]).inc();
}
