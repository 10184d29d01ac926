mod deletion;
mod helpers;
mod notifications;
mod relationships;
mod workers;
