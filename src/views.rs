//! Text rendering for the terminal front end.

use crate::bookings::BookingSnapshot;
use crate::models::{Booking, Dorm, User};
use crate::session::SessionPhase;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Render `content` only once the session is known
pub fn gated<F: FnOnce() -> String>(ready: bool, content: F) -> String {
    if !ready {
        "Loading session...".to_string()
    } else {
        content()
    }
}

pub fn session_line(phase: SessionPhase, user: Option<&User>) -> String {
    match (phase, user) {
        (SessionPhase::Loading, _) => "Session: verifying...".to_string(),
        (_, Some(user)) => {
            let mut line = format!("Logged in as {} ({})", user.username, user.role.as_str());
            if let Some(school_id) = &user.school_id_number {
                line.push_str(&format!(", school ID {}", school_id));
            }
            line
        }
        (_, None) => "Not logged in. Use /login <username>".to_string(),
    }
}

fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 {
        format!("{:.0}", rate)
    } else {
        format!("{:.2}", rate)
    }
}

pub fn dorm_card(dorm: &Dorm) -> String {
    let mut out = format!("{}  [#{}]\n", dorm.name, dorm.id);
    out.push_str(&format!(
        "  \u{20b1}{}/mo  |  {} mins walk\n",
        format_rate(dorm.monthly_rate),
        dorm.distance_minutes
    ));
    if let Some(address) = &dorm.address {
        out.push_str(&format!("  {}\n", address));
    }
    if let Some(thumbnail) = &dorm.thumbnail {
        out.push_str(&format!("  Photo: {}\n", thumbnail));
    }
    if !dorm.amenities.is_empty() {
        out.push_str(&format!("  Amenities: {}\n", dorm.amenities.join(", ")));
    }
    out.push_str(&format!("  Book: /book {} <start> <end>", dorm.id));
    out
}

pub fn dorm_list(dorms: &[Dorm]) -> String {
    if dorms.is_empty() {
        return "No dorms match.".to_string();
    }
    dorms.iter().map(dorm_card).collect::<Vec<_>>().join("\n\n")
}

fn booking_row(booking: &Booking) -> String {
    let status = if booking.is_placeholder() {
        "(saving)"
    } else {
        booking.status.as_str()
    };
    format!(
        "  {:<12} dorm {:<6} {} -> {}  {}",
        booking.id,
        booking.dorm,
        booking.start.format(DATE_FORMAT),
        booking.end.format(DATE_FORMAT),
        status
    )
}

pub fn error_banner(error: Option<&str>) -> Option<String> {
    error.map(|message| format!("! {}", message))
}

pub fn booking_table(snapshot: &BookingSnapshot) -> String {
    let mut lines = Vec::new();
    if let Some(banner) = error_banner(snapshot.error.as_deref()) {
        lines.push(banner);
    }
    if snapshot.bookings.is_empty() {
        lines.push("No bookings.".to_string());
    } else {
        lines.push(format!("Bookings ({}):", snapshot.bookings.len()));
        lines.extend(snapshot.bookings.iter().map(booking_row));
    }
    if snapshot.loading {
        lines.push("Loading...".to_string());
    }
    lines.join("\n")
}
