mod admin;
mod helpers;
mod orders;
mod payouts;
mod settlement;
