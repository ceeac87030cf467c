/// Zestawy uprawnień nakładane na użytkownika w gildii.
/// Adapter platformy decyduje, jak je zmapować (Discord: timeout / zdjęcie timeoutu).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionSet {
    /// Blokada wszystkiego – stan "Restricted".
    DenyAll,
    /// Stały zestaw: tekst + media (self-unban).
    TextAndMedia,
    /// Domyślne uprawnienia gildii (unban przez admina).
    GroupDefault,
}

impl PermissionSet {
    pub fn is_restrictive(self) -> bool {
        matches!(self, PermissionSet::DenyAll)
    }
}
