/*!
 * Notification
 *
 * Per-handle readiness interest and the fan-out run when a provider reports
 * a status change on a file:
 * - **Edge**: one push per interested handle, sent to the owner's relay
 * - **Level**: nothing pushed; the relay polls current status
 * - **Blocked**: a single parked call per client, woken and re-dispatched
 */

mod fanout;

pub use fanout::Wakeup;
