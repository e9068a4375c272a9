use chrono::{DateTime, Local, TimeZone, Timelike};

pub const TOKEN_PREFIX: &str = "CGS";

const MASK_VISIBLE_CHARS: usize = 4;

pub fn generate_token() -> String {
    token_at(&Local::now())
}

pub fn token_at<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let clock = at.format("%H%M%S");
    let sub_second = format!("{:06}", at.nanosecond() % 1_000_000);
    format!("{}-{}-{}", TOKEN_PREFIX, clock, &sub_second[..4])
}

pub fn mask_token(token: &str) -> String {
    let parts = token.split('-').collect::<Vec<_>>();
    if parts.len() != 3 {
        return token.to_string();
    }

    let visible = parts[1]
        .char_indices()
        .nth(MASK_VISIBLE_CHARS)
        .map(|(idx, _)| &parts[1][..idx])
        .unwrap_or(parts[1]);
    format!("{}-{}...", parts[0], visible)
}

pub fn is_well_formed_token(token: &str) -> bool {
    let mut parts = token.split('-');
    let (Some(prefix), Some(clock), Some(suffix), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    prefix == TOKEN_PREFIX
        && clock.len() == 6
        && clock.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == 4
        && suffix.bytes().all(|b| b.is_ascii_digit())
}
