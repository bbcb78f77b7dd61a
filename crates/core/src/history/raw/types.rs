use alloc::vec::Vec;
use core::fmt::{Debug, Display, Formatter, Result};

/// A single read or write as recorded by a client.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Event<Key, Value> {
    Read {
        key: Key,
        // None reads the key's initial value
        value: Option<Value>,
    },
    Write {
        key: Key,
        value: Value,
    },
}

impl<Key, Value> Event<Key, Value> {
    pub const fn read_initial(key: Key) -> Self {
        Self::Read { key, value: None }
    }

    pub const fn read(key: Key, value: Value) -> Self {
        Self::Read {
            key,
            value: Some(value),
        }
    }

    pub const fn write(key: Key, value: Value) -> Self {
        Self::Write { key, value }
    }

    #[must_use]
    pub const fn key(&self) -> &Key {
        match self {
            Self::Read { key, .. } | Self::Write { key, .. } => key,
        }
    }

    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

impl<Key, Value> Debug for Event<Key, Value>
where
    Key: Debug,
    Value: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Read { key, value } => {
                write!(f, "{key:?}=>")?;
                if let Some(value) = value {
                    write!(f, "{value:?}")?;
                } else {
                    write!(f, "?")?;
                }
            }
            Self::Write { key, value } => {
                write!(f, "{key:?}<={value:?}")?;
            }
        }
        Ok(())
    }
}

/// Text DSL form: `x:=1` for writes, `x==1` for reads, `x==?` for initial reads.
impl<Key, Value> Display for Event<Key, Value>
where
    Key: Display,
    Value: Display,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Read {
                key,
                value: Some(value),
            } => write!(f, "{key}=={value}"),
            Self::Read { key, value: None } => write!(f, "{key}==?"),
            Self::Write { key, value } => write!(f, "{key}:={value}"),
        }
    }
}

/// A recorded transaction: its events and whether it committed.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Clone, PartialEq, Eq)]
pub struct Transaction<Key, Value> {
    pub events: Vec<Event<Key, Value>>,
    pub committed: bool,
}

impl<Key, Value> Transaction<Key, Value> {
    #[must_use]
    pub const fn committed(events: Vec<Event<Key, Value>>) -> Self {
        Self {
            events,
            committed: true,
        }
    }

    #[must_use]
    pub const fn uncommitted(events: Vec<Event<Key, Value>>) -> Self {
        Self {
            events,
            committed: false,
        }
    }
}

impl<Key, Value> Debug for Transaction<Key, Value>
where
    Key: Debug,
    Value: Debug,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{:?}", self.events)?;
        if !self.committed {
            write!(f, "!")?;
        }
        Ok(())
    }
}

impl<Key, Value> Display for Transaction<Key, Value>
where
    Key: Display,
    Value: Display,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "[")?;
        for (i, event) in self.events.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{event}")?;
        }
        write!(f, "]")?;
        if !self.committed {
            write!(f, "!")?;
        }
        Ok(())
    }
}

/// An ordered sequence of transactions from a single client.
pub type Session<Key, Value> = Vec<Transaction<Key, Value>>;
