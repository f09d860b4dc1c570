/// A parsed memory mapping from /proc/[pid]/maps
///
/// Line format: `start-end perms offset dev:dev inode [pathname]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    /// Backing path, empty for anonymous mappings
    pub pathname: String,
}

impl Region {
    /// Parse one maps line; `None` for lines that do not follow the format
    pub fn parse(line: &str) -> Option<Region> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            return None;
        }

        // Parse address range "start-end"
        let (start, end) = parts[0].split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;
        if start >= end {
            return None;
        }

        let perms = parts[1].to_string();
        let offset = u64::from_str_radix(parts[2], 16).ok()?;

        // Pathname is everything after the inode (may contain spaces)
        let pathname = if parts.len() >= 6 {
            parts[5..].join(" ")
        } else {
            String::new()
        };

        Some(Region {
            start,
            end,
            perms,
            offset,
            pathname,
        })
    }

    pub fn exec(&self) -> bool {
        self.perms.as_bytes().get(2) == Some(&b'x')
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Offset of `addr` within the backing file
    pub fn file_offset(&self, addr: u64) -> u64 {
        (addr - self.start).wrapping_add(self.offset)
    }
}

/// Executable regions of a maps listing, in listing order
pub fn executable_regions(content: &str) -> Vec<Region> {
    content
        .lines()
        .filter_map(Region::parse)
        .filter(Region::exec)
        .collect()
}
