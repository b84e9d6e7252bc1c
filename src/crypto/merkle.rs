use super::hash::{Hashable, H256};

/// A Merkle tree over a list of hashable items. The root of an empty list is the zero hash.
#[derive(Debug)]
pub struct MerkleTree {
    nodes: Vec<H256>,
}

fn hash_pair(left: &H256, right: &H256) -> H256 {
    let mut ctx = ring::digest::Context::new(&ring::digest::SHA256);
    ctx.update(&left.0);
    ctx.update(&right.0);
    ctx.finish().into()
}

impl MerkleTree {
    pub fn new<T: Hashable>(data: &[T]) -> Self {
        if data.is_empty() {
            return MerkleTree {
                nodes: vec![H256::default()],
            };
        }
        // calculate the size of the tree
        let mut this_layer_size = data.len();
        let mut layer_size = vec![]; // size after dup
        let mut data_size = vec![]; // size before dup
        loop {
            data_size.push(this_layer_size);
            if this_layer_size == 1 {
                layer_size.push(this_layer_size);
                break;
            }
            if this_layer_size & 0x01 == 1 {
                this_layer_size += 1;
            }
            layer_size.push(this_layer_size);
            this_layer_size = this_layer_size >> 1;
        }
        let tree_size = layer_size.iter().sum();

        let mut nodes: Vec<H256> = vec![Default::default(); tree_size];

        // fill in the bottom layer
        let mut layer_start = tree_size;
        let mut layers = layer_size.iter().zip(data_size.iter());
        let (l, d) = layers.next().unwrap();
        layer_start -= l;
        let hashed_data: Vec<H256> = data.iter().map(|x| x.hash()).collect();
        nodes[layer_start..layer_start + d].copy_from_slice(&hashed_data);
        if l != d {
            nodes[layer_start + l - 1] = nodes[layer_start + d - 1];
        }

        // fill in other layers
        for (l, d) in layers {
            let last_layer_start = layer_start;
            layer_start -= l;
            for i in 0..*d {
                nodes[layer_start + i] = hash_pair(
                    &nodes[last_layer_start + (i << 1)],
                    &nodes[last_layer_start + (i << 1) + 1],
                );
            }
            if l != d {
                nodes[layer_start + l - 1] = nodes[layer_start + d - 1];
            }
        }

        MerkleTree { nodes }
    }

    pub fn root(&self) -> H256 {
        self.nodes[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn leaves(n: u8) -> Vec<H256> {
        (0..n).map(|i| H256([i; 32])).collect()
    }

    #[test]
    fn empty_root_is_zero() {
        let tree = MerkleTree::new::<H256>(&[]);
        assert!(tree.root().is_zero());
    }

    #[test]
    fn single_leaf() {
        let input: H256 = (&hex!(
            "0a0b0c0d0e0f0e0d0a0b0c0d0e0f0e0d0a0b0c0d0e0f0e0d0a0b0c0d0e0f0e0d"
        ))
            .into();
        let tree = MerkleTree::new(&[input]);
        assert_eq!(tree.root(), input.hash());
    }

    #[test]
    fn two_leaves() {
        let data = leaves(2);
        let tree = MerkleTree::new(&data);
        assert_eq!(tree.root(), hash_pair(&data[0].hash(), &data[1].hash()));
    }

    #[test]
    fn odd_layer_duplicates_last() {
        let data = leaves(3);
        let tree = MerkleTree::new(&data);
        let left = hash_pair(&data[0].hash(), &data[1].hash());
        let right = hash_pair(&data[2].hash(), &data[2].hash());
        assert_eq!(tree.root(), hash_pair(&left, &right));
    }

    #[test]
    fn root_depends_on_order_and_content() {
        for n in 2..20 {
            let data = leaves(n);
            let root = MerkleTree::new(&data).root();
            let mut swapped = data.clone();
            swapped.swap(0, (n - 1) as usize);
            assert_ne!(MerkleTree::new(&swapped).root(), root);
            let mut changed = data.clone();
            changed[(n / 2) as usize] = H256([0xee; 32]);
            assert_ne!(MerkleTree::new(&changed).root(), root);
            assert_eq!(MerkleTree::new(&data).root(), root);
        }
    }
}
