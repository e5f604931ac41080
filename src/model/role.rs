#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Admin = 1,
    Principal = 2,
    DeputyWarden = 3,
    GateStaff = 4,
    Student = 5,
    Guardian = 6,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Principal),
            3 => Some(Role::DeputyWarden),
            4 => Some(Role::GateStaff),
            5 => Some(Role::Student),
            6 => Some(Role::Guardian),
            _ => None,
        }
    }
}
