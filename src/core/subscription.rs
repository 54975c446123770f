/// Version counter owned by a view. Requests carry the ticket current at the
/// time they were issued; once the view is torn down the counter moves on and
/// late completions are recognised and dropped.
#[derive(Debug, Default)]
pub struct Generation(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Generation {
    pub fn ticket(&self) -> Ticket {
        Ticket(self.0)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.0 == ticket.0
    }

    pub fn bump(&mut self) {
        self.0 += 1;
    }
}
