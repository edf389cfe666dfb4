//! Booking store with optimistic creates.
//!
//! Each create inserts its own placeholder (see [`Booking::placeholder`]) and
//! later replaces or removes exactly that entry, so overlapping creates from
//! different threads never touch each other's rows. The state lock is never
//! held across a network call.

use crate::config::BookingsConfig;
use crate::error::ApiError;
use crate::http::SecureClient;
use crate::models::{Booking, DateRange, NewBooking, Page};
use crate::session::SessionPhase;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const INVALID_RANGE: &str = "Start date must be before end date";

#[derive(Debug, Clone)]
struct ErrorBanner {
    message: String,
    raised_at: Instant,
}

#[derive(Debug, Default)]
struct BookingState {
    bookings: Vec<Booking>,
    current: Option<Booking>,
    loading: bool,
    error: Option<ErrorBanner>,
}

/// Point-in-time copy of the store for rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingSnapshot {
    pub bookings: Vec<Booking>,
    pub current: Option<Booking>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct BookingStore {
    client: Arc<SecureClient>,
    state: Mutex<BookingState>,
    page_size: u32,
    error_ttl: Duration,
}

impl BookingStore {
    pub fn new(client: Arc<SecureClient>, config: &BookingsConfig) -> Self {
        Self {
            client,
            state: Mutex::new(BookingState::default()),
            page_size: config.page_size,
            error_ttl: Duration::from_millis(config.error_ttl_ms),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BookingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_error(&self, message: impl Into<String>) {
        self.lock().error = Some(ErrorBanner {
            message: message.into(),
            raised_at: Instant::now(),
        });
    }

    fn live_error(&self, state: &mut BookingState) -> Option<String> {
        if let Some(banner) = &state.error {
            if banner.raised_at.elapsed() < self.error_ttl {
                return Some(banner.message.clone());
            }
            state.error = None;
        }
        None
    }

    /// Copy of the current state for rendering. Bookings held from a session
    /// that has since ended (explicit logout or a failed refresh) are dropped
    /// first. The error banner expires after the configured delay.
    pub fn snapshot(&self) -> BookingSnapshot {
        let mut state = self.lock();
        if self.client.session().phase() == SessionPhase::Anonymous && !state.bookings.is_empty() {
            debug!(dropped = state.bookings.len(), "session ended, dropping bookings");
            state.bookings.clear();
            state.current = None;
        }
        let error = self.live_error(&mut state);
        BookingSnapshot {
            bookings: state.bookings.clone(),
            current: state.current.clone(),
            loading: state.loading,
            error,
        }
    }

    /// Forget every locally known booking
    pub fn clear(&self) {
        let mut state = self.lock();
        state.bookings.clear();
        state.current = None;
    }

    fn begin_request(&self) {
        let mut state = self.lock();
        state.loading = true;
        state.error = None;
    }

    /// Fetch one page and append it to the list. Returns how many entries
    /// were appended. Pages are not de-duplicated against what is already held.
    pub fn fetch_bookings(&self, page: Option<u32>, limit: Option<u32>) -> Result<usize, ApiError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.page_size);
        self.begin_request();

        let result = self
            .client
            .get(&format!("/bookings/?page={}&limit={}", page, limit))
            .and_then(|response| {
                if response.is_ok() {
                    response.json::<Page<Booking>>()
                } else {
                    Err(response.into_error("Failed to fetch bookings"))
                }
            });

        let mut state = self.lock();
        state.loading = false;
        match result {
            Ok(fetched) => {
                let appended = fetched.results.len();
                state.bookings.extend(fetched.results);
                debug!(
                    page,
                    limit,
                    appended,
                    server_total = ?fetched.count,
                    more = fetched.next.is_some(),
                    total = state.bookings.len(),
                    "fetched bookings"
                );
                Ok(appended)
            }
            Err(err) => {
                warn!(page, error = %err, "fetching bookings failed");
                drop(state);
                self.set_error(err.user_message());
                Err(err)
            }
        }
    }

    /// Create a booking, showing it immediately as pending.
    pub fn create_booking(&self, dorm_id: &str, range: DateRange) -> Result<Booking, ApiError> {
        if !range.is_valid() {
            self.set_error(INVALID_RANGE);
            return Err(ApiError::Validation(INVALID_RANGE.to_string()));
        }

        let placeholder = Booking::placeholder(dorm_id, &range);
        let local_id = placeholder.id.clone();
        {
            let mut state = self.lock();
            state.bookings.push(placeholder.clone());
            state.current = Some(placeholder);
        }

        let body = serde_json::to_value(NewBooking::new(dorm_id, &range))
            .map_err(|e| ApiError::Decode(e.to_string()));
        let result = body
            .and_then(|body| self.client.post("/bookings/", Some(body)))
            .and_then(|response| {
                if response.is_ok() {
                    response.json::<Booking>()
                } else {
                    Err(response.into_error("Booking failed"))
                }
            });

        match result {
            Ok(booking) => {
                let mut state = self.lock();
                if let Some(slot) = state.bookings.iter_mut().find(|b| b.id == local_id) {
                    *slot = booking.clone();
                } else {
                    // Cleared while the request was in flight
                    state.bookings.push(booking.clone());
                }
                state.current = Some(booking.clone());
                info!(id = %booking.id, dorm = %booking.dorm, "booking created");
                Ok(booking)
            }
            Err(err) => {
                {
                    let mut state = self.lock();
                    state.bookings.retain(|b| b.id != local_id);
                    if state.current.as_ref().is_some_and(|b| b.id == local_id) {
                        state.current = None;
                    }
                }
                warn!(dorm = dorm_id, error = %err, "booking failed");
                self.set_error(err.user_message());
                Err(err)
            }
        }
    }

    /// Cancel a booking on the server, then drop it locally.
    pub fn cancel_booking(&self, id: &str) -> Result<(), ApiError> {
        self.begin_request();
        let result = self
            .client
            .delete(&format!("/bookings/{}/", id))
            .and_then(|response| {
                if response.is_ok() {
                    Ok(())
                } else {
                    Err(response.into_error("Cancellation failed"))
                }
            });

        let mut state = self.lock();
        state.loading = false;
        match result {
            Ok(()) => {
                state.bookings.retain(|b| b.id != id);
                state.current = None;
                info!(id, "booking cancelled");
                Ok(())
            }
            Err(err) => {
                drop(state);
                warn!(id, error = %err, "cancellation failed");
                self.set_error(err.user_message());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
impl BookingStore {
    pub fn bookings(&self) -> Vec<Booking> {
        self.lock().bookings.clone()
    }

    pub fn current_booking(&self) -> Option<Booking> {
        self.lock().current.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        let mut state = self.lock();
        self.live_error(&mut state)
    }
}
