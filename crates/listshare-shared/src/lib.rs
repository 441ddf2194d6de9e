use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct ItemDto {
  pub id:        String,
  pub name:      String,
  #[serde(default)]
  pub completed: bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct ListDto {
  pub id:         String,
  #[serde(default)]
  pub name:       String,
  #[serde(default)]
  pub items:      Vec<ItemDto>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub created_at: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub updated_at: Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct CreateListArgs {
  pub name: String
}

/// Body of both the add-item and the
/// rename-item requests.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ItemNameArgs {
  pub name: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct PopularItemDto {
  pub name:  String,
  #[serde(default)]
  pub count: Option<u64>
}

/// Tagged events sent over the per-list
/// push channel.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(
  tag = "type",
  rename_all = "snake_case"
)]
pub enum PushMessage {
  ListUpdated {
    list: ListDto
  },
  #[serde(other)]
  Unknown
}
