//! Event families carried by the platform.
//!
//! | family         | queue          | message types |
//! |----------------|----------------|---------------|
//! | subscription   | user           | `Subscribe`, `Unsubscribe` |
//! | subscription   | user_compensate| `CompensateSubscribe`, `CompensateUnsubscribe` |
//! | rate           | rate           | `RateFetched` |
//! | mail (command) | mail           | `SendEmail` |

pub mod mail;
pub mod rate;
pub mod subscription;

pub use mail::{MAIL, MailData, SEND_EMAIL};
pub use rate::{RATE_FETCHED, RATES, RateData};
pub use subscription::{SUBSCRIPTIONS, SubscriberData, SubscriptionEvent};
